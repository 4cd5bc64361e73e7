//! Jenkins Pipeline job `config.xml` patching.
//!
//! Plugin XML varies between Jenkins versions, so blocks are located by tag
//! scanning rather than schema validation. Every function is idempotent:
//! applying it twice yields the same document as applying it once. Missing
//! tags mean "nothing to remove"; a missing `<properties>` block is created.
//! When a document cannot be patched safely an [`XmlEditError`] is returned
//! and the caller must not write anything back to Jenkins.

use std::sync::LazyLock;

use regex::Regex;

const TRIGGERS_PROPERTY: &str = "org.jenkinsci.plugins.workflow.job.properties.PipelineTriggersJobProperty";
const PUSH_TRIGGER: &str =
    r#"<com.cloudbees.jenkins.GitHubPushTrigger plugin="github@1.43.0"><spec></spec></com.cloudbees.jenkins.GitHubPushTrigger>"#;

static PROPERTY_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)\s*<org\.jenkinsci\.plugins\.workflow\.job\.properties\.PipelineTriggersJobProperty(?:\s[^>]*)?(?:/>|>(.*?)</org\.jenkinsci\.plugins\.workflow\.job\.properties\.PipelineTriggersJobProperty>)",
    )
    .unwrap()
});
static TRIGGERS_INNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<triggers>(.*?)</triggers>").unwrap());
static TIMER_WITH_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<hudson\.triggers\.TimerTrigger>\s*<spec>.*?</spec>\s*</hudson\.triggers\.TimerTrigger>")
        .unwrap()
});
static TIMER_EMPTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<hudson\.triggers\.TimerTrigger>\s*</hudson\.triggers\.TimerTrigger>|<hudson\.triggers\.TimerTrigger\s*/>")
        .unwrap()
});
static PUSH_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<com\.cloudbees\.jenkins\.GitHubPushTrigger(?:\s[^>]*)?(?:/>|>.*?</com\.cloudbees\.jenkins\.GitHubPushTrigger>)",
    )
    .unwrap()
});
static HTTP_PUBLISHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)\s*<hudson\.plugins\.http_request\.HttpRequestPublisher(?:\s[^>]*)?>.*?</hudson\.plugins\.http_request\.HttpRequestPublisher>",
    )
    .unwrap()
});
static PUBLISHER_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<url>(.*?)</url>").unwrap());
static PUBLISHER_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<json>.*?</json>|<json\s*/>").unwrap());
static DISABLED_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<disabled>(?:true|false)</disabled>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlEditError {
    #[error("not a Pipeline job config (no <flow-definition> root)")]
    NotPipelineJob,
    #[error("no <properties> block or </flow-definition> anchor to insert into")]
    MissingAnchor,
    #[error("unbalanced markup inside <triggers>")]
    Malformed,
}

/// Ensure exactly one timer trigger with `cron` exists.
///
/// Every `PipelineTriggersJobProperty` block is replaced by a single one
/// placed inside `<properties>`. Non-timer triggers found in the removed
/// blocks are carried over into the new one.
pub fn ensure_timer_trigger(xml: &str, cron: &str) -> Result<String, XmlEditError> {
    require_pipeline(xml)?;
    let without_timers = remove_timer_trigger(xml);
    let (stripped, mut entries) = take_trigger_entries(&without_timers)?;
    entries.insert(
        0,
        format!(
            "<hudson.triggers.TimerTrigger><spec>{}</spec></hudson.triggers.TimerTrigger>",
            escape_text(cron.trim())
        ),
    );
    insert_into_properties(&stripped, &trigger_property_block(&entries))
}

/// Strip timer triggers, leaving other trigger types in place.
pub fn remove_timer_trigger(xml: &str) -> String {
    if !xml.contains("<hudson.triggers.TimerTrigger") {
        return xml.to_string();
    }
    let xml = TIMER_WITH_SPEC.replace_all(xml, "");
    TIMER_EMPTY.replace_all(&xml, "").into_owned()
}

/// Ensure a GitHub push trigger is present, without touching a timer trigger.
pub fn ensure_push_trigger(xml: &str) -> Result<String, XmlEditError> {
    require_pipeline(xml)?;
    let (stripped, mut entries) = take_trigger_entries(xml)?;
    let present = entries.iter().any(|e| PUSH_ENTRY.is_match(e));
    if present && PROPERTY_BLOCK.find_iter(xml).count() == 1 {
        return Ok(xml.to_string());
    }
    if !present {
        entries.push(PUSH_TRIGGER.to_string());
    }
    insert_into_properties(&stripped, &trigger_property_block(&entries))
}

/// Strip GitHub push triggers, leaving other trigger types in place.
pub fn remove_push_trigger(xml: &str) -> String {
    PUSH_ENTRY.replace_all(xml, "").into_owned()
}

/// Ensure exactly one HTTP result publisher posts to `webhook_url`.
///
/// An existing publisher for the same URL keeps its settings and only gets a
/// fresh JSON body; extra publishers for that URL are dropped. Publishers
/// pointing elsewhere are left alone.
pub fn ensure_result_webhook(
    xml: &str,
    webhook_url: &str,
    job_name: &str,
    task_type: &str,
    task_id: &str,
) -> Result<String, XmlEditError> {
    require_pipeline(xml)?;
    let body = escape_text(&result_json_body(job_name, task_type, task_id));
    let url = escape_text(webhook_url);

    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    let mut kept = false;
    for publisher in HTTP_PUBLISHER.find_iter(xml) {
        let block = publisher.as_str();
        let targets_us = PUBLISHER_URL
            .captures(block)
            .and_then(|c| c.get(1))
            .is_some_and(|m| m.as_str().trim() == url);
        if !targets_us {
            continue;
        }
        out.push_str(&xml[last..publisher.start()]);
        if !kept {
            out.push_str(&with_json_body(block, &body));
            kept = true;
        }
        last = publisher.end();
    }
    out.push_str(&xml[last..]);
    if kept {
        return Ok(out);
    }

    let publisher = publisher_block(&url, &body);
    if out.contains("<publishers/>") {
        return Ok(out.replacen(
            "<publishers/>",
            &format!("<publishers>{publisher}\n  </publishers>"),
            1,
        ));
    }
    if let Some(pos) = out.find("<publishers>") {
        let at = pos + "<publishers>".len();
        out.insert_str(at, &publisher);
        return Ok(out);
    }
    let section = format!("\n  <publishers>{publisher}\n  </publishers>");
    if let Some(disabled) = DISABLED_TAG.find(&out) {
        let at = disabled.end();
        out.insert_str(at, &section);
        return Ok(out);
    }
    match out.rfind("</flow-definition>") {
        Some(pos) => {
            out.insert_str(pos, &format!("{section}\n"));
            Ok(out)
        }
        None => Err(XmlEditError::MissingAnchor),
    }
}

/// Body Jenkins posts when a build finishes.
pub fn result_json_body(job_name: &str, task_type: &str, task_id: &str) -> String {
    format!(
        r#"{{"name": "{job_name}", "build": {{"number": "${{BUILD_NUMBER}}", "result": "${{BUILD_RESULT}}", "status": "FINISHED"}}, "task_type": "{task_type}", "task_id": "{task_id}"}}"#
    )
}

fn require_pipeline(xml: &str) -> Result<(), XmlEditError> {
    if xml.contains("<flow-definition") {
        Ok(())
    } else {
        Err(XmlEditError::NotPipelineJob)
    }
}

/// Remove every trigger property block and return the triggers they held.
fn take_trigger_entries(xml: &str) -> Result<(String, Vec<String>), XmlEditError> {
    let mut entries = Vec::new();
    for block in PROPERTY_BLOCK.captures_iter(xml) {
        let Some(inner) = block.get(1) else { continue };
        for triggers in TRIGGERS_INNER.captures_iter(inner.as_str()) {
            if let Some(content) = triggers.get(1) {
                entries.extend(top_level_elements(content.as_str())?.into_iter().map(str::to_string));
            }
        }
    }
    Ok((PROPERTY_BLOCK.replace_all(xml, "").into_owned(), entries))
}

fn trigger_property_block(entries: &[String]) -> String {
    let mut block = format!("<{TRIGGERS_PROPERTY}>\n  <triggers>\n");
    for entry in entries {
        block.push_str("    ");
        block.push_str(entry);
        block.push('\n');
    }
    block.push_str(&format!("  </triggers>\n</{TRIGGERS_PROPERTY}>\n"));
    block
}

fn insert_into_properties(xml: &str, block: &str) -> Result<String, XmlEditError> {
    if xml.contains("<properties/>") {
        return Ok(xml.replacen("<properties/>", &format!("<properties>\n{block}</properties>"), 1));
    }
    if let Some(open) = xml.find("<properties>") {
        let inner_start = open + "<properties>".len();
        let inner_end = xml[inner_start..]
            .find("</properties>")
            .map(|offset| inner_start + offset)
            .ok_or(XmlEditError::Malformed)?;
        let rest = xml[inner_start..inner_end].trim();
        let rebuilt = if rest.is_empty() {
            format!("<properties>\n{block}")
        } else {
            format!("<properties>\n{block}{rest}\n")
        };
        return Ok(format!("{}{rebuilt}{}", &xml[..open], &xml[inner_end..]));
    }
    match xml.rfind("</flow-definition>") {
        Some(pos) => {
            let mut out = xml.to_string();
            out.insert_str(pos, &format!("<properties>\n{block}</properties>\n"));
            Ok(out)
        }
        None => Err(XmlEditError::MissingAnchor),
    }
}

fn with_json_body(block: &str, body: &str) -> String {
    let json = format!("<json>{body}</json>");
    if PUBLISHER_JSON.is_match(block) {
        return PUBLISHER_JSON
            .replace(block, regex::NoExpand(&json))
            .into_owned();
    }
    let close = "</hudson.plugins.http_request.HttpRequestPublisher>";
    match block.rfind(close) {
        Some(pos) => format!("{}  {json}\n    {}", &block[..pos], &block[pos..]),
        None => block.to_string(),
    }
}

fn publisher_block(url: &str, body: &str) -> String {
    format!(
        r#"
    <hudson.plugins.http_request.HttpRequestPublisher plugin="http_request@1.16">
      <configName></configName>
      <validResponseCodes>200,201,202</validResponseCodes>
      <url>{url}</url>
      <ignoreSslErrors>false</ignoreSslErrors>
      <passBuildParameters>false</passBuildParameters>
      <passAllBuildParameters>false</passAllBuildParameters>
      <customHeaders/>
      <json>{body}</json>
      <timeout>30000</timeout>
      <consoleLogResponseBody>false</consoleLogResponseBody>
      <quiet>false</quiet>
      <authentication/>
    </hudson.plugins.http_request.HttpRequestPublisher>"#
    )
}

/// Split element content into its top-level child elements.
fn top_level_elements(content: &str) -> Result<Vec<&str>, XmlEditError> {
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut pos = 0;
    while let Some(offset) = content[pos..].find('<') {
        let open = pos + offset;
        if content[open..].starts_with("<!--") {
            let end = content[open..]
                .find("-->")
                .ok_or(XmlEditError::Malformed)?;
            pos = open + end + 3;
            continue;
        }
        let close = open + content[open..].find('>').ok_or(XmlEditError::Malformed)?;
        let tag = &content[open..=close];
        if tag.starts_with("</") {
            depth = depth.checked_sub(1).ok_or(XmlEditError::Malformed)?;
            if depth == 0 {
                if let Some(begin) = start.take() {
                    elements.push(&content[begin..=close]);
                }
            }
        } else if tag.ends_with("/>") {
            if depth == 0 {
                elements.push(tag);
            }
        } else {
            if depth == 0 {
                start = Some(open);
            }
            depth += 1;
        }
        pos = close + 1;
    }
    if depth != 0 {
        return Err(XmlEditError::Malformed);
    }
    Ok(elements)
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
