//! Resource naming and tagging

use rand::Rng;
use std::collections::BTreeMap;

use crate::config::AccountContext;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric id of length `len`
pub fn random_id(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Join the non-empty parts with `sep`, lowercased
pub fn format_name<S: AsRef<str>>(sep: &str, parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
        .to_lowercase()
}

/// Tags every resource of a test deployment carries
pub fn common_tags(
    account: &AccountContext,
    project: &str,
    service: &str,
    test_id: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("TestID".to_string(), test_id.to_string()),
        ("Account".to_string(), account.account_name.clone()),
        ("Region".to_string(), account.region.clone()),
        ("Project".to_string(), project.to_string()),
        ("Service".to_string(), service.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_id() {
        let id = random_id(4);
        assert_eq!(id.len(), 4);
        assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
        assert_eq!(random_id(0), "");
    }

    #[test]
    fn test_format_name() {
        assert_eq!(format_name("-", &["Scraper", "", "detector", "DEV", "a1b2"]), "scraper-detector-dev-a1b2");
        assert_eq!(format_name("_", &["ms", " grpc "]), "ms_grpc");
        assert_eq!(format_name::<&str>("-", &[]), "");
    }

    #[test]
    fn test_common_tags() {
        let account = AccountContext::new("dev", "123456789012", "us-east-1");
        let tags = common_tags(&account, "scraper", "detector", "a1b2");
        assert_eq!(tags["Account"], "dev");
        assert_eq!(tags["Region"], "us-east-1");
        assert_eq!(tags["TestID"], "a1b2");
        assert_eq!(tags.len(), 5);
    }
}
