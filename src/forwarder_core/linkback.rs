//! Console links embedded in forwarded records

use super::record::{append_field, RecordFields};
use crate::config::ForwarderConfig;
use reqwest::Url;

#[derive(Debug, Clone)]
pub struct Linkback {
    ui_url: String,
    org_uid: String,
}

impl Linkback {
    pub fn new(ui_url: impl Into<String>, org_uid: impl Into<String>) -> Self {
        Self {
            ui_url: ui_url.into().trim_end_matches('/').to_string(),
            org_uid: org_uid.into(),
        }
    }

    /// `Some` only when linkbacks are enabled in the config.
    pub fn from_config(config: &ForwarderConfig) -> Option<Self> {
        match (&config.ui_url, config.linkback) {
            (Some(ui_url), true) => Some(Self::new(ui_url.clone(), config.org_uid.clone())),
            _ => None,
        }
    }

    pub fn url(&self, muid: &str, id: &str) -> Option<Url> {
        let mut url = Url::parse(&format!(
            "{}/app/org/{}/source/{}/spyder-console",
            self.ui_url, self.org_uid, muid
        ))
        .ok()?;
        url.query_pairs_mut().append_pair("ids", id);
        Some(url)
    }

    /// Adds a `linkback` field unless the record already carries one.
    pub fn annotate(&self, record: &mut Vec<u8>, fields: &RecordFields) -> bool {
        if fields.linkback.as_deref().map_or(false, |l| !l.is_empty()) {
            return false;
        }
        let muid = fields.muid.as_deref().unwrap_or_default();
        let id = fields.id.as_deref().unwrap_or_default();
        let Some(url) = self.url(muid, id) else {
            log::debug!("⚠️  Could not build linkback for muid={} id={}", muid, id);
            return false;
        };
        match serde_json::to_string(url.as_str()) {
            Ok(value) => append_field(record, "linkback", &value),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder_core::record::is_valid_json;

    #[test]
    fn test_url_escapes_id() {
        let linkback = Linkback::new("https://console.example.com/", "org1");
        let url = linkback.url("mach:abc", "event:1 2&3").unwrap();
        assert_eq!(
            url.as_str(),
            "https://console.example.com/app/org/org1/source/mach:abc/spyder-console?ids=event%3A1+2%263"
        );
    }

    #[test]
    fn test_annotate_appends_field() {
        let linkback = Linkback::new("https://console.example.com", "org1");
        let mut record = br#"{"muid":"mach:abc","id":"ev1"}"#.to_vec();
        let fields = RecordFields::peek(&record).unwrap();

        assert!(linkback.annotate(&mut record, &fields));
        assert!(is_valid_json(&record));

        let annotated = RecordFields::peek(&record).unwrap();
        assert_eq!(
            annotated.linkback.as_deref(),
            Some("https://console.example.com/app/org/org1/source/mach:abc/spyder-console?ids=ev1")
        );
    }

    #[test]
    fn test_existing_linkback_is_kept() {
        let linkback = Linkback::new("https://console.example.com", "org1");
        let original = br#"{"muid":"m","id":"i","linkback":"https://elsewhere"}"#.to_vec();
        let mut record = original.clone();
        let fields = RecordFields::peek(&record).unwrap();

        assert!(!linkback.annotate(&mut record, &fields));
        assert_eq!(record, original);
    }
}
