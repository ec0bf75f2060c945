use url::form_urlencoded;

/// Install referrer as delivered by the install broadcast: a URL-query-encoded
/// string of `key=value` pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Referrer(String);

impl Referrer {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// First value of `key`, decoded. A leading `?` is tolerated.
    pub fn param(&self, key: &str) -> Option<String> {
        let raw = self.0.strip_prefix('?').unwrap_or(&self.0);
        form_urlencoded::parse(raw.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn has_param_value(&self, key: &str, value: &str) -> bool {
        self.param(key).as_deref() == Some(value)
    }
}

impl From<&str> for Referrer {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_decoded_params() {
        let r = Referrer::new("utm_source=xing&xing_conversion_id=abc%20123&x=1");
        assert_eq!(r.param("xing_conversion_id").as_deref(), Some("abc 123"));
        assert_eq!(r.param("utm_source").as_deref(), Some("xing"));
        assert_eq!(r.param("missing"), None);
    }

    #[test]
    fn first_value_wins_and_leading_question_mark_ignored() {
        let r = Referrer::new("?a=1&a=2");
        assert_eq!(r.param("a").as_deref(), Some("1"));
    }

    #[test]
    fn source_match() {
        let r = Referrer::new("utm_source=xing");
        assert!(r.has_param_value("utm_source", "xing"));
        assert!(!r.has_param_value("utm_source", "google"));
        assert!(Referrer::new("  ").is_empty());
    }
}
