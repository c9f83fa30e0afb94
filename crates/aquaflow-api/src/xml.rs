//! Response parsing for the AquaFlow Connect portal.
//!
//! Responses are small XML documents. They are parsed with `roxmltree`
//! (DTDs rejected, so external entities cannot be resolved -- this is
//! untrusted network input) into a tree, then vendor-specific
//! `<c n="..." v="..."/>` leaf elements are flattened into an ordered
//! attribute map.

use indexmap::IndexMap;
use roxmltree::{Document, Node};

use crate::error::Error;

/// Ordered map of vendor attribute keys (e.g. `getPRS`) to raw values.
///
/// Metadata attributes of a `<c>` leaf appear as synthetic sibling keys
/// with a suffix (`getPRS_dt`, `getPRS_m`, `getPRS_acd`, `getPRS_ih`).
/// Suffix keys are present only when the corresponding attribute was on
/// the wire; the base key is always present for a parsed leaf.
pub type AttributeMap = IndexMap<String, String>;

/// A project as it appears in the decrypted login response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireProject {
    pub id: String,
    pub name: String,
}

/// A device entry from a device-list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireDevice {
    /// User-facing serial number.
    pub serial: String,
    /// The vendor's internal collection identifier (`dclg`), required for
    /// all status/control requests.
    pub control_id: String,
    /// Display name: the portal alias when one exists, else the serial.
    pub name: String,
}

/// Parsed login session data.
#[derive(Debug, Clone)]
pub struct LoginData {
    pub token: String,
    pub projects: Vec<WireProject>,
}

/// Tri-state device-status parse result.
///
/// `Incomplete` means the response was structurally valid XML but carried
/// no telemetry -- an empirically observed truncated-response shape, not a
/// documented protocol state. Callers must treat it as "no new
/// information" and never overwrite prior state with it. It is distinct
/// from a valid-but-empty map and from a parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPayload {
    Telemetry(AttributeMap),
    Incomplete,
}

/// Parse a response body, rejecting malformed XML.
fn parse(text: &str) -> Result<Document<'_>, Error> {
    Document::parse(text).map_err(|e| Error::Parse(e.to_string()))
}

/// Extract the base64 AES blob from a login response (`root.api@v`).
pub fn parse_login(text: &str) -> Result<String, Error> {
    let doc = parse(text)?;
    doc.descendants()
        .find(|n| n.has_tag_name("api"))
        .and_then(|n| n.attribute("v"))
        .map(str::to_owned)
        .ok_or(Error::Protocol {
            message: "login response has no api element".into(),
        })
}

/// Parse the decrypted login fragment into a session token and projects.
///
/// The fragment is not a complete document, so it is wrapped in a
/// synthetic root first. A single `<pre>` child is still one project --
/// element iteration normalizes it into a list.
pub fn parse_decrypted_login(fragment: &str) -> Result<LoginData, Error> {
    let wrapped = format!("<login>{fragment}</login>");
    let doc = parse(&wrapped)?;

    let token = doc
        .descendants()
        .find(|n| n.has_tag_name("usr"))
        .and_then(|n| n.attribute("id"))
        .map(str::to_owned)
        .ok_or(Error::Protocol {
            message: "decrypted login has no usr id".into(),
        })?;

    let projects: Vec<WireProject> = doc
        .descendants()
        .filter(|n| n.has_tag_name("pre"))
        .filter_map(|n| {
            let id = n.attribute("id")?;
            Some(WireProject {
                id: id.to_owned(),
                name: n.attribute("n").unwrap_or(id).to_owned(),
            })
        })
        .collect();

    if projects.is_empty() {
        return Err(Error::Protocol {
            message: "decrypted login has no projects".into(),
        });
    }

    Ok(LoginData { token, projects })
}

/// Parse a device-list response.
///
/// Alias mappings come from `<dcl dclg=".." ali=".."/>` entries; device
/// entries from `<d dclg=".." sn=".."/>`. An entry missing its control id
/// or serial is skipped entirely, never defaulted.
pub fn parse_device_list(text: &str) -> Result<Vec<WireDevice>, Error> {
    let doc = parse(text)?;

    let aliases: IndexMap<String, String> = doc
        .descendants()
        .filter(|n| n.has_tag_name("dcl"))
        .filter_map(|n| {
            Some((n.attribute("dclg")?.to_owned(), n.attribute("ali")?.to_owned()))
        })
        .collect();

    let devices = doc
        .descendants()
        .filter(|n| n.has_tag_name("d"))
        .filter_map(|n| {
            let control_id = n.attribute("dclg")?;
            let serial = n.attribute("sn")?;
            let name = aliases
                .get(control_id)
                .cloned()
                .unwrap_or_else(|| serial.to_owned());
            Some(WireDevice {
                serial: serial.to_owned(),
                control_id: control_id.to_owned(),
                name,
            })
        })
        .collect();

    Ok(devices)
}

/// Parse a device-status response into the tri-state [`StatusPayload`].
///
/// `Incomplete` is returned when the response lacks a `dvs` element,
/// lacks any device entry, or no device entry carries at least one `<c>`
/// leaf. This heuristic for truncated vendor responses is intentionally
/// confined to this function.
pub fn parse_device_status(text: &str) -> Result<StatusPayload, Error> {
    let doc = parse(text)?;

    let Some(dvs) = doc.descendants().find(|n| n.has_tag_name("dvs")) else {
        return Ok(StatusPayload::Incomplete);
    };

    let entries: Vec<Node<'_, '_>> = dvs
        .descendants()
        .filter(|n| n.has_tag_name("d"))
        .collect();
    if entries.is_empty() {
        return Ok(StatusPayload::Incomplete);
    }

    let has_leaf = entries.iter().any(|d| {
        d.descendants()
            .any(|n| n.has_tag_name("c") && n.attribute("n").is_some() && n.attribute("v").is_some())
    });
    if !has_leaf {
        return Ok(StatusPayload::Incomplete);
    }

    let mut map = AttributeMap::new();
    for entry in entries {
        flatten_into(entry, &mut map, false);
    }
    Ok(StatusPayload::Telemetry(map))
}

/// Parse a statistics response.
///
/// A top-level `<msg>` element is a soft error and yields an empty map.
/// The checksum element is stripped before flattening.
pub fn parse_statistics(text: &str) -> Result<AttributeMap, Error> {
    let doc = parse(text)?;

    if doc.root_element().children().any(|n| n.has_tag_name("msg")) {
        return Ok(AttributeMap::new());
    }

    let mut map = AttributeMap::new();
    for entry in doc.descendants().filter(|n| n.has_tag_name("d")) {
        flatten_into(entry, &mut map, true);
    }
    Ok(map)
}

/// Flatten a subtree into the attribute map.
///
/// Attributes become map entries under their plain names; element text
/// becomes a synthetic `_text` key; each `<c n="K" v="V">` leaf becomes
/// `map[K] = V` with its `dt`/`m`/`acd`/`ih` attributes as `K_suffix`
/// siblings. A `<c>` missing either `n` or `v` is dropped. Same-tag
/// siblings flatten in encounter order; key collisions are last-write-wins
/// (an accepted ambiguity of the vendor schema).
fn flatten_into(node: Node<'_, '_>, map: &mut AttributeMap, skip_checksum: bool) {
    if skip_checksum && node.has_tag_name("cs") {
        return;
    }

    if node.has_tag_name("c") {
        if let (Some(key), Some(value)) = (node.attribute("n"), node.attribute("v")) {
            map.insert(key.to_owned(), value.to_owned());
            for suffix in ["dt", "m", "acd", "ih"] {
                if let Some(meta) = node.attribute(suffix) {
                    map.insert(format!("{key}_{suffix}"), meta.to_owned());
                }
            }
        }
        return;
    }

    for attr in node.attributes() {
        map.insert(attr.name().to_owned(), attr.value().to_owned());
    }

    let text: String = node
        .children()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_owned();
    if !text.is_empty() {
        map.insert("_text".to_owned(), text);
    }

    for child in node.children().filter(Node::is_element) {
        flatten_into(child, map, skip_checksum);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(matches!(parse_login("<sc><api"), Err(Error::Parse(_))));
    }

    #[test]
    fn documents_with_a_dtd_are_rejected() {
        // Untrusted input: entity definitions must not parse at all.
        let text = r#"<!DOCTYPE sc [<!ENTITY x "y">]><sc><api v="&x;"/></sc>"#;
        assert!(matches!(parse_login(text), Err(Error::Parse(_))));
    }

    #[test]
    fn login_without_api_element_is_a_protocol_error() {
        let result = parse_login(r#"<sc><err m="wrong password"/></sc>"#);
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn login_blob_is_extracted() {
        let blob = parse_login(r#"<sc><api v="QUJD"/></sc>"#).unwrap();
        assert_eq!(blob, "QUJD");
    }

    #[test]
    fn decrypted_login_yields_token_and_projects() {
        let data = parse_decrypted_login(
            r#"<usr id="S1"/><prs><pre id="P1" n="Home"/><pre id="P2" n="Cabin"/></prs>"#,
        )
        .unwrap();
        assert_eq!(data.token, "S1");
        assert_eq!(
            data.projects,
            vec![
                WireProject { id: "P1".into(), name: "Home".into() },
                WireProject { id: "P2".into(), name: "Cabin".into() },
            ]
        );
    }

    #[test]
    fn single_project_is_normalized_into_a_list() {
        let data =
            parse_decrypted_login(r#"<usr id="S1"/><prs><pre id="P1" n="Home"/></prs>"#).unwrap();
        assert_eq!(data.projects.len(), 1);
    }

    #[test]
    fn decrypted_login_without_usr_id_is_a_protocol_error() {
        let result = parse_decrypted_login(r#"<prs><pre id="P1" n="Home"/></prs>"#);
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn device_list_applies_aliases_and_serial_fallback() {
        let text = r#"<sc>
            <col><dcl dclg="D1" ali="Basement"/></col>
            <dvs>
                <d dclg="D1" sn="SN-1"/>
                <d dclg="D2" sn="SN-2"/>
            </dvs>
        </sc>"#;
        let devices = parse_device_list(text).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Basement");
        assert_eq!(devices[1].name, "SN-2");
    }

    #[test]
    fn device_without_control_id_is_skipped() {
        let text = r#"<sc><dvs><d sn="SN-1"/><d dclg="D2" sn="SN-2"/></dvs></sc>"#;
        let devices = parse_device_list(text).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].control_id, "D2");
    }

    #[test]
    fn status_without_dvs_is_incomplete() {
        let result = parse_device_status("<sc><msg>pending</msg></sc>").unwrap();
        assert_eq!(result, StatusPayload::Incomplete);
    }

    #[test]
    fn status_without_c_leaves_is_incomplete_not_empty() {
        let result = parse_device_status(r#"<sc><dvs><d dclg="D1"/></dvs></sc>"#).unwrap();
        assert_eq!(result, StatusPayload::Incomplete);
    }

    #[test]
    fn status_telemetry_flattens_leaves_and_metadata() {
        let text = r#"<sc><dvs><d dclg="D1">
            <c n="getPRS" v="39" m="bar"/>
            <c n="getSLT" v="12" dt="2024-06-01"/>
            <c v="orphan"/>
        </d></dvs></sc>"#;
        let StatusPayload::Telemetry(map) = parse_device_status(text).unwrap() else {
            panic!("expected telemetry");
        };
        assert_eq!(map.get("getPRS").map(String::as_str), Some("39"));
        assert_eq!(map.get("getPRS_m").map(String::as_str), Some("bar"));
        assert_eq!(map.get("getSLT_dt").map(String::as_str), Some("2024-06-01"));
        assert_eq!(map.get("dclg").map(String::as_str), Some("D1"));
        // A <c> without n is dropped, not defaulted.
        assert!(!map.values().any(|v| v == "orphan"));
    }

    #[test]
    fn collisions_are_last_write_wins_in_encounter_order() {
        let text = r#"<sc><dvs>
            <d dclg="D1"><c n="getPRS" v="1"/></d>
            <d dclg="D2"><c n="getPRS" v="2"/></d>
        </dvs></sc>"#;
        let StatusPayload::Telemetry(map) = parse_device_status(text).unwrap() else {
            panic!("expected telemetry");
        };
        assert_eq!(map.get("getPRS").map(String::as_str), Some("2"));
    }

    #[test]
    fn statistics_msg_is_a_soft_error() {
        let map = parse_statistics(r#"<sc><msg>no data</msg></sc>"#).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn statistics_strips_the_checksum_element() {
        let text = r#"<sc><dvs><d dclg="D1">
            <c n="getWS1" v="120"/><cs v="1A2B"/>
        </d></dvs></sc>"#;
        let map = parse_statistics(text).unwrap();
        assert_eq!(map.get("getWS1").map(String::as_str), Some("120"));
        assert!(!map.values().any(|v| v == "1A2B"));
    }
}
