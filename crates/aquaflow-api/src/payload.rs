//! Outgoing request documents.
//!
//! The portal accepts small hand-framed XML documents. Every builder
//! returns a complete document string; all except login are signed by the
//! checksum engine before they leave this module. Every user-controlled
//! field is XML-escaped -- device ids and command names can arrive from
//! uncontrolled upstream sources, so this is a correctness requirement,
//! not hardening.

use std::fmt;

use crate::checksum;

/// Client identity the portal expects in the login request.
pub const APP_ID: &str = "aquaflow-connect";
/// Vendor app version the portal protocol is pinned to.
pub const APP_VERSION: &str = "1.8.2";
const CLIENT_OS: &str = "Android 13";

/// A command value on its way to the portal.
///
/// Booleans are coerced to `1`/`0`; everything else is stringified as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("1"),
            Self::Bool(false) => f.write_str("0"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for CommandValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for CommandValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for CommandValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

/// Which consumption series a statistics request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticsKind {
    Water,
    Salt,
}

impl StatisticsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Salt => "salt",
        }
    }
}

/// Escape a string for use in XML attribute values.
fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Build the unsigned login document.
///
/// Carries client metadata and a `YYYY-MM-DD HH:MM:SS` local timestamp;
/// the login endpoint does not validate a checksum.
pub fn build_login(username: &str, password: &str) -> String {
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        r#"<sc><gp app="{APP_ID}" ver="{APP_VERSION}" os="{CLIENT_OS}" dt="{stamp}"/><usr n="{}" pwd="{}"/></sc>"#,
        escape(username),
        escape(password),
    )
}

/// Build the signed device-list request for one project.
pub fn build_device_list(token: &str, project_id: &str) -> String {
    checksum::sign_document(&format!(
        r#"<sc><si v="{APP_VERSION}"/><us ug="{}"/><pr pid="{}"/></sc>"#,
        escape(token),
        escape(project_id),
    ))
}

/// Build the signed device-status request for one device collection.
pub fn build_device_status(token: &str, control_id: &str) -> String {
    checksum::sign_document(&format!(
        r#"<sc><si v="{APP_VERSION}"/><us ug="{}"/><col><dcl dclg="{}"/></col></sc>"#,
        escape(token),
        escape(control_id),
    ))
}

/// Build the signed set-status (control write) request.
pub fn build_set_status(
    token: &str,
    control_id: &str,
    command: &str,
    value: &CommandValue,
) -> String {
    checksum::sign_document(&format!(
        r#"<sc><si v="{APP_VERSION}"/><us ug="{}"/><col><dcl dclg="{}"><c n="{}" v="{}"/></dcl></col></sc>"#,
        escape(token),
        escape(control_id),
        escape(command),
        escape(&value.to_string()),
    ))
}

/// Build the signed statistics request for one consumption series.
pub fn build_statistics(token: &str, control_id: &str, kind: StatisticsKind) -> String {
    checksum::sign_document(&format!(
        r#"<sc><si v="{APP_VERSION}"/><us ug="{}"/><col><dcl dclg="{}"><sta t="{}"/></dcl></col></sc>"#,
        escape(token),
        escape(control_id),
        kind.as_str(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn attr<'a>(doc: &'a roxmltree::Document<'_>, tag: &str, name: &str) -> Option<&'a str> {
        doc.descendants()
            .find(|n| n.has_tag_name(tag))
            .and_then(|n| n.attribute(name))
    }

    #[test]
    fn device_status_round_trips_through_the_parser() {
        let xml = build_device_status("S1", "D1");
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(attr(&doc, "us", "ug"), Some("S1"));
        assert_eq!(attr(&doc, "dcl", "dclg"), Some("D1"));
        // Signed: the digest element sits before the closing root tag.
        assert!(attr(&doc, "cs", "v").is_some());
    }

    #[test]
    fn login_is_unsigned_and_escapes_credentials() {
        let xml = build_login(r#"fritz&sohn"#, r#"pa<ss>"word"#);
        assert!(!xml.contains("<cs"));
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(attr(&doc, "usr", "n"), Some("fritz&sohn"));
        assert_eq!(attr(&doc, "usr", "pwd"), Some(r#"pa<ss>"word"#));
        assert!(attr(&doc, "gp", "dt").is_some());
    }

    #[test]
    fn set_status_coerces_booleans() {
        let on = build_set_status("S1", "D1", "setAB", &CommandValue::Bool(true));
        let off = build_set_status("S1", "D1", "setAB", &CommandValue::Bool(false));
        assert!(on.contains(r#"v="1""#));
        assert!(off.contains(r#"v="0""#));
    }

    #[test]
    fn set_status_passes_other_values_through() {
        let xml = build_set_status("S1", "D1", "setSV1", &CommandValue::Int(25));
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(attr(&doc, "c", "n"), Some("setSV1"));
        assert_eq!(attr(&doc, "c", "v"), Some("25"));
    }

    #[test]
    fn statistics_carries_the_series_kind() {
        let xml = build_statistics("S1", "D1", StatisticsKind::Salt);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(attr(&doc, "sta", "t"), Some("salt"));
    }

    #[test]
    fn hostile_device_id_cannot_break_out_of_the_document() {
        let xml = build_device_status("S1", r#""/><evil attr="x"#);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert!(!doc.descendants().any(|n| n.has_tag_name("evil")));
    }
}
