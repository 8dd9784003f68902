//! URL normalization
//!
//! Rewrites the client identifier of intercepted video info requests so the
//! server hands out streams it would otherwise gate for TV clients. Only
//! [`normalize`] is applied on the interception path; the remaining functions
//! are alternate strategies kept for manual use.

use crate::types::VideoClassification;
use url::Url;

const TV_CLIENT_TOKEN: &str = "&c=TVHTML5";
const HTML5_CLIENT_TOKEN: &str = "&c=HTML5";

/// Query keys dropped by [`strip_tracking_params`]
pub const TRACKING_PARAMS: &[&str] = &[
    "cpn", "itct", "ei", "hl", "lact", "cos", "cosver", "cplatform", "width", "height",
    "cbrver", "ctheme", "cmodel", "cnetwork", "c", "cver", "cplayer", "cbrand", "cbr", "el",
    "ps",
];

/// Normalize an intercepted URL for the given video classification.
///
/// Matches the literal `&c=TVHTML5` only; a leading `?c=TVHTML5` is left alone.
pub fn normalize(url: &str, classification: VideoClassification) -> String {
    match classification {
        VideoClassification::Default => url.to_string(),
        VideoClassification::Live
        | VideoClassification::Upcoming
        | VideoClassification::Undefined => url.replace(TV_CLIENT_TOKEN, HTML5_CLIENT_TOKEN),
    }
}

/// Force `c=HTML5` through a real query rewrite
pub fn force_html5_client(url: &str) -> String {
    rewrite_query(url, |pairs| set_param(pairs, "c", "HTML5"))
}

/// Ask for the DASH manifest and 60fps formats
pub fn unlock_60fps_formats(url: &str) -> String {
    rewrite_query(url, |pairs| {
        set_param(pairs, "el", "info");
        set_param(pairs, "ps", "default");
    })
}

/// Drop client telemetry and player-shaping parameters
pub fn strip_tracking_params(url: &str) -> String {
    rewrite_query(url, |pairs| {
        pairs.retain(|(key, _)| !TRACKING_PARAMS.contains(&key.as_str()))
    })
}

fn set_param(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some(pair) => pair.1 = value.to_string(),
        None => pairs.push((key.to_string(), value.to_string())),
    }
}

/// Apply `edit` to the query pairs of `url`. Unparseable input is returned as-is.
fn rewrite_query<F>(url: &str, edit: F) -> String
where
    F: FnOnce(&mut Vec<(String, String)>),
{
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    edit(&mut pairs);

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }
    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TV_URL: &str =
        "https://www.youtube.com/get_video_info?video_id=abc&c=TVHTML5&cver=6.20180913";

    #[test]
    fn test_default_is_identity() {
        assert_eq!(normalize(TV_URL, VideoClassification::Default), TV_URL);
        assert_eq!(normalize("", VideoClassification::Default), "");
    }

    #[test]
    fn test_live_replaces_client_token() {
        for class in [
            VideoClassification::Live,
            VideoClassification::Upcoming,
            VideoClassification::Undefined,
        ] {
            let out = normalize(TV_URL, class);
            assert!(out.contains("&c=HTML5"));
            assert!(!out.contains("&c=TVHTML5"));
            assert!(out.ends_with("&cver=6.20180913"));
        }
    }

    #[test]
    fn test_only_exact_token_form_matches() {
        let leading = "https://h/get_video_info?c=TVHTML5&video_id=abc";
        assert_eq!(normalize(leading, VideoClassification::Live), leading);
    }

    #[test]
    fn test_force_html5_client() {
        let out = force_html5_client(TV_URL);
        let url = Url::parse(&out).unwrap();
        let c: Vec<_> = url.query_pairs().filter(|(k, _)| k == "c").collect();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].1, "HTML5");

        let added = force_html5_client("https://h/get_video_info?video_id=abc");
        assert!(added.ends_with("&c=HTML5"));
    }

    #[test]
    fn test_unlock_60fps_formats() {
        let out = unlock_60fps_formats("https://h/get_video_info?video_id=abc&el=leanback");
        assert!(out.contains("el=info"));
        assert!(out.contains("ps=default"));
        assert!(!out.contains("leanback"));
    }

    #[test]
    fn test_strip_tracking_params() {
        let out = strip_tracking_params(
            "https://h/get_video_info?video_id=abc&cpn=xyz&hl=en&c=TVHTML5&list=PL1",
        );
        assert_eq!(out, "https://h/get_video_info?video_id=abc&list=PL1");

        let out = strip_tracking_params("https://h/get_video_info?cpn=1");
        assert_eq!(out, "https://h/get_video_info");
    }

    #[test]
    fn test_alternates_pass_through_unparseable() {
        assert_eq!(strip_tracking_params("/relative?cpn=1"), "/relative?cpn=1");
    }
}
