//! 🔗 URL Classifier: "so... how did you hear about us?"
//!
//! 🎬 COLD OPEN. A referrer URL walks into the pipeline:
//! `http://www.google.com/search?hl=en&q=ipod+nano&aq=f`. It says nothing.
//! It doesn't have to. Its query string says everything.
//!
//! This module takes a raw URL apart (scheme, subdomain, registrable domain,
//! top-level domain, query parameters), decides which search engine it came
//! from, and pulls out the keyword phrase a human actually typed.
//!
//! 🧠 Knowledge graph:
//! - `ParsedUrl<'a>` borrows from the input line. No allocation until we know
//!   the URL is worth keeping.
//! - "not found" for `://`, `/`, or `?` means "that optional piece is absent",
//!   never a failure.
//! - `classify()` is what the attribution engine calls; it returns `None` for
//!   anything that is not a searchable referral.
//!
//! 🦆 The duck was referred here by Bing. Nobody believes it.

use std::collections::HashMap;

use serde::Deserialize;

/// 🏷️ Domain label when the host has fewer than two dot-separated labels.
pub const UNKNOWN_DOMAIN: &str = "Unknown";
/// 🏷️ Domain label for a registrable domain outside the search-engine allow-list.
pub const OTHER_DOMAIN: &str = "Other";
/// 🏷️ Keyword phrase when a URL has parameters but none of the keyword ones.
pub const UNKNOWN_KEYWORDS: &str = "Unknown";

/// 🔧 What counts as a search engine, and where each one hides its query.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// 🔎 Canonical, capitalized names. Matched case-insensitively against the registrable domain.
    #[serde(default = "default_search_engines")]
    pub search_engines: Vec<String>,
    /// 🗝️ Query parameter names checked in priority order for the keyword phrase.
    #[serde(default = "default_keyword_parameters")]
    pub keyword_parameters: Vec<String>,
}

fn default_search_engines() -> Vec<String> {
    ["Google", "Bing", "Yahoo", "Yandex", "Baidu", "DuckDuckGo", "Ask", "Aol"]
        .into_iter()
        .map(String::from)
        .collect()
}

// -- 🗝️ q: google/bing/ddg/ask, p: yahoo, text: yandex, wd: baidu
fn default_keyword_parameters() -> Vec<String> {
    ["q", "p", "text", "wd"].into_iter().map(String::from).collect()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            search_engines: default_search_engines(),
            keyword_parameters: default_keyword_parameters(),
        }
    }
}

/// 🧭 Where a visitor came from: the engine and what they typed into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferralInfo {
    pub search_engine_domain: String,
    pub keywords: String,
}

/// 🔬 A URL, disassembled. Every field borrows from the original string.
///
/// Defaults for the missing bits: `scheme`, `subdomain` and `top_domain` are
/// empty, `domain` is `None` (rendered as [`UNKNOWN_DOMAIN`]), `parameters` is
/// empty and `has_query` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl<'a> {
    pub scheme: &'a str,
    pub subdomain: &'a str,
    pub domain: Option<&'a str>,
    pub top_domain: &'a str,
    pub has_query: bool,
    pub parameters: HashMap<&'a str, &'a str>,
}

impl<'a> ParsedUrl<'a> {
    /// 🔪 Take a URL apart. `None` only when there is no `://` to anchor on.
    pub fn parse(url: &'a str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;

        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, remainder) = rest.split_at(authority_end);

        // -- 🧹 user@host:port → host
        let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        let host = host.split_once(':').map_or(host, |(host, _)| host);

        let mut labels = host.rsplit('.');
        let top_domain = labels.next().unwrap_or("");
        let domain = labels.next();
        let subdomain = labels.next().unwrap_or("");

        // -- 🔖 a fragment ends the URL as far as the query is concerned
        let before_fragment = remainder.split('#').next().unwrap_or("");
        let query = before_fragment.split_once('?').map(|(_, query)| query);

        let mut parameters = HashMap::new();
        if let Some(query) = query {
            for pair in query.split('&') {
                // -- 🚮 "flag" without "=" gets dropped, duplicates: last one wins
                if let Some((key, value)) = pair.split_once('=') {
                    parameters.insert(key, value);
                }
            }
        }

        Some(Self {
            scheme,
            subdomain,
            domain,
            top_domain,
            has_query: query.is_some(),
            parameters,
        })
    }

    /// 🔎 Map the registrable domain onto the allow-list: canonical name, `Unknown`, or `Other`.
    pub fn search_engine(&self, config: &ClassifierConfig) -> String {
        let Some(domain) = self.domain else {
            return UNKNOWN_DOMAIN.to_string();
        };
        config
            .search_engines
            .iter()
            .find(|engine| engine.eq_ignore_ascii_case(domain))
            .cloned()
            .unwrap_or_else(|| OTHER_DOMAIN.to_string())
    }

    /// 💬 The keyword phrase.
    ///
    /// Empty when there are no parameters at all, [`UNKNOWN_KEYWORDS`] when none
    /// of the keyword parameters is present, otherwise the first match in
    /// priority order, decoded and title-cased.
    pub fn keywords(&self, config: &ClassifierConfig) -> String {
        if self.parameters.is_empty() {
            return String::new();
        }
        config
            .keyword_parameters
            .iter()
            .find_map(|key| self.parameters.get(key.as_str()))
            .map(|value| title_case(&decode_spaces(value)))
            .unwrap_or_else(|| UNKNOWN_KEYWORDS.to_string())
    }
}

/// 🧭 URL in, referral out. `None` means "nothing searchable here, don't remember it".
pub fn classify(url: &str, config: &ClassifierConfig) -> Option<ReferralInfo> {
    let parsed = ParsedUrl::parse(url)?;
    if !parsed.has_query {
        return None;
    }
    let keywords = parsed.keywords(config);
    if keywords.is_empty() {
        return None;
    }
    Some(ReferralInfo {
        search_engine_domain: parsed.search_engine(config),
        keywords,
    })
}

/// ➕ `+` and `%20` both mean a space. Nothing else is decoded.
pub fn decode_spaces(value: &str) -> String {
    value.replace('+', " ").replace("%20", " ")
}

/// 🎩 Title-case: a letter goes upper after a non-letter, lower after a letter.
///
/// `"ipod nano"` → `"Ipod Nano"`, `"3d tv"` → `"3D Tv"`, `"o'neil"` → `"O'Neil"`.
pub fn title_case(text: &str) -> String {
    let mut titled = String::with_capacity(text.len());
    let mut previous_was_letter = false;
    for c in text.chars() {
        if previous_was_letter {
            titled.extend(c.to_lowercase());
        } else {
            titled.extend(c.to_uppercase());
        }
        previous_was_letter = c.is_alphabetic();
    }
    titled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn the_default_config() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    #[test]
    fn the_one_where_google_sends_us_running_shoes() {
        let the_referral = classify(
            "http://www.google.com/search?q=running+shoes",
            &the_default_config(),
        );
        assert_eq!(
            the_referral,
            Some(ReferralInfo {
                search_engine_domain: "Google".to_string(),
                keywords: "Running Shoes".to_string(),
            })
        );
    }

    #[test]
    fn the_one_where_the_url_gets_fully_dissected() {
        let the_parsed = ParsedUrl::parse("https://search.yahoo.com/search?p=cd+player&toggle=1&cop=mss")
            .expect("💀 a perfectly normal URL failed to parse");

        assert_eq!(the_parsed.scheme, "https");
        assert_eq!(the_parsed.subdomain, "search");
        assert_eq!(the_parsed.domain, Some("yahoo"));
        assert_eq!(the_parsed.top_domain, "com");
        assert!(the_parsed.has_query);
        assert_eq!(the_parsed.parameters.len(), 3);
        assert_eq!(the_parsed.parameters.get("p"), Some(&"cd+player"));
    }

    #[test]
    fn the_one_where_each_engine_hides_its_query_somewhere_else() {
        let config = the_default_config();
        let the_cases = [
            ("http://www.bing.com/search?q=Zune&go=&form=QBLH", "Bing", "Zune"),
            ("http://search.yahoo.com/search?p=cd+player", "Yahoo", "Cd Player"),
            ("https://yandex.ru/search/?text=ipod%20touch", "Yandex", "Ipod Touch"),
            ("https://www.baidu.com/s?wd=ipod", "Baidu", "Ipod"),
        ];

        for (the_url, the_engine, the_keywords) in the_cases {
            let the_referral = classify(the_url, &config)
                .unwrap_or_else(|| panic!("💀 {the_url} should have been a referral"));
            assert_eq!(the_referral.search_engine_domain, the_engine, "engine for {the_url}");
            assert_eq!(the_referral.keywords, the_keywords, "keywords for {the_url}");
        }
    }

    #[test]
    fn the_one_where_q_outranks_p_even_when_p_came_first() {
        let the_referral = classify("http://www.google.com/?p=loser&q=winner", &the_default_config())
            .expect("💀 expected a referral");
        assert_eq!(the_referral.keywords, "Winner");
    }

    #[test]
    fn the_one_where_duplicate_keys_let_the_last_one_talk() {
        let the_referral = classify("http://www.google.com/search?q=first&q=second", &the_default_config())
            .expect("💀 expected a referral");
        assert_eq!(the_referral.keywords, "Second");
    }

    #[test]
    fn the_one_where_unknown_engines_become_other_regardless_of_case() {
        let config = the_default_config();
        let the_shouty_one = classify("http://WWW.GOOGLE.COM/search?q=ipod", &config)
            .expect("💀 expected a referral");
        assert_eq!(the_shouty_one.search_engine_domain, "Google");

        let the_stranger = classify("http://www.esshopzilla.com/product/?pid=as32213", &config)
            .expect("💀 expected a referral");
        assert_eq!(the_stranger.search_engine_domain, "Other");
        assert_eq!(the_stranger.keywords, "Unknown");
    }

    #[test]
    fn the_one_where_a_single_label_host_stays_unknown() {
        let the_referral = classify("http://localhost/search?q=test", &the_default_config())
            .expect("💀 expected a referral");
        assert_eq!(the_referral.search_engine_domain, "Unknown");
        assert_eq!(the_referral.keywords, "Test");
    }

    #[test]
    fn the_one_where_missing_pieces_mean_absent_not_broken() {
        let config = the_default_config();
        // -- 🚫 no scheme terminator
        assert_eq!(classify("www.google.com/search?q=ipod", &config), None);
        // -- 🚫 no query string
        assert_eq!(classify("http://www.google.com/search", &config), None);
        // -- 🚫 no path, no query
        assert_eq!(classify("http://www.google.com", &config), None);
        // -- 🚫 "?" but every pair lacks "="
        assert_eq!(classify("http://www.google.com/search?flag&other", &config), None);
        // -- 🚫 the "?" lives inside the fragment
        assert_eq!(classify("http://www.google.com/#frag?q=ipod", &config), None);
    }

    #[test]
    fn the_one_where_there_is_no_slash_but_there_is_a_query() {
        let the_referral = classify("http://www.google.com?q=ipod+nano", &the_default_config())
            .expect("💀 a query with no path is still a query");
        assert_eq!(the_referral.keywords, "Ipod Nano");
        assert_eq!(the_referral.search_engine_domain, "Google");
    }

    #[test]
    fn the_one_where_ports_and_userinfo_do_not_confuse_the_domain() {
        let the_parsed = ParsedUrl::parse("http://me@www.bing.com:8080/search?q=zune#results")
            .expect("💀 expected a parse");
        assert_eq!(the_parsed.domain, Some("bing"));
        assert_eq!(the_parsed.top_domain, "com");
        assert_eq!(the_parsed.parameters.get("q"), Some(&"zune"));
    }

    #[test]
    fn the_one_where_title_case_behaves_like_the_reports_expect() {
        assert_eq!(title_case("ipod nano"), "Ipod Nano");
        assert_eq!(title_case("IPOD"), "Ipod");
        assert_eq!(title_case("3d tv"), "3D Tv");
        assert_eq!(title_case("o'neil"), "O'Neil");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn the_one_where_only_plus_and_percent_twenty_become_spaces() {
        assert_eq!(decode_spaces("ipod+nano%20case"), "ipod nano case");
        assert_eq!(decode_spaces("caf%C3%A9"), "caf%C3%A9");
    }

    #[test]
    fn the_one_where_custom_engines_and_keys_come_from_config() {
        let config = ClassifierConfig {
            search_engines: vec!["Ecosia".to_string()],
            keyword_parameters: vec!["query".to_string()],
        };
        let the_referral = classify("https://www.ecosia.org/search?query=trees", &config)
            .expect("💀 expected a referral");
        assert_eq!(the_referral.search_engine_domain, "Ecosia");
        assert_eq!(the_referral.keywords, "Trees");
    }
}
