//! Compile-then-query tests over real filter list snippets.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bw_core::types::{ContentFiltersData, ContentType, InstallationState, MatchDecision, SnippetCall};
use bw_core::{CompiledIndex, InstalledSubscription, RegexCache, SubscriptionCollection};

use crate::converter::{compile, CompileConfig};

fn compile_list(text: &str, source_url: &str) -> Vec<u8> {
    let config = CompileConfig {
        source_url: source_url.to_owned(),
        allow_privileged: true,
        require_header: false,
    };
    compile(text, &config).index().expect("list should compile")
}

fn install(text: &str, source_url: &str) -> Arc<InstalledSubscription> {
    let index = CompiledIndex::from_bytes(compile_list(text, source_url)).expect("snapshot should load");
    Arc::new(InstalledSubscription::new(
        Arc::new(index),
        InstallationState::Installed,
        SystemTime::UNIX_EPOCH,
    ))
}

fn collection(lists: &[(&str, &str)]) -> SubscriptionCollection {
    let subscriptions = lists.iter().map(|(url, text)| install(text, url)).collect();
    SubscriptionCollection::new(subscriptions, "adblock")
}

fn single(text: &str) -> SubscriptionCollection {
    collection(&[("https://lists.test/easylist.txt", text)])
}

fn decision(collection: &SubscriptionCollection, url: &str, hierarchy: &[&str], content_type: ContentType) -> MatchDecision {
    collection.classify_request(url, hierarchy, content_type, "").decision
}

#[test]
fn test_content_type_restriction() {
    let collection = single("testpages.adblockplus.org/testfiles/stylesheet/$stylesheet");
    let url = "https://testpages.adblockplus.org/testfiles/stylesheet/file.css";
    assert_eq!(decision(&collection, url, &[], ContentType::STYLESHEET), MatchDecision::Blocked);
    assert_eq!(decision(&collection, url, &[], ContentType::IMAGE), MatchDecision::NoMatch);
}

#[test]
fn test_third_party_block_without_applicable_allow() {
    let collection = single(
        "||media.net^$third-party\n\
         @@||media.net^$document\n\
         @@||media.net^$third-party,domain=~fandom.com\n\
         @@||contextual.media.net/bidexchange.js",
    );
    let result = collection.classify_request(
        "https://hbx.media.net/bidexchange.js",
        &["https://roblox.fandom.com/"],
        ContentType::SCRIPT,
        "",
    );
    assert_eq!(result.decision, MatchDecision::Blocked);
    assert_eq!(result.source_url.as_deref(), Some("https://lists.test/easylist.txt"));
}

#[test]
fn test_allow_from_another_subscription_wins() {
    let collection = collection(&[
        ("https://lists.test/block.txt", "||ads.example.com^"),
        ("https://lists.test/allow.txt", "@@||ads.example.com/ok/"),
    ]);
    let blocked = collection.classify_request("https://ads.example.com/bad/x.js", &[], ContentType::SCRIPT, "");
    assert_eq!(blocked.decision, MatchDecision::Blocked);
    assert_eq!(blocked.source_url.as_deref(), Some("https://lists.test/block.txt"));

    let allowed = collection.classify_request("https://ads.example.com/ok/x.js", &[], ContentType::SCRIPT, "");
    assert_eq!(allowed.decision, MatchDecision::Allowed);
    assert_eq!(allowed.source_url.as_deref(), Some("https://lists.test/allow.txt"));
}

#[test]
fn test_document_exception_on_ancestor() {
    let collection = single("||ads.example.com^\n@@||trusted.org^$document");
    let url = "https://ads.example.com/banner.png";
    assert_eq!(
        decision(&collection, url, &["https://trusted.org/page"], ContentType::IMAGE),
        MatchDecision::Allowed
    );
    assert_eq!(
        decision(
            &collection,
            url,
            &["https://frame.test/", "https://trusted.org/page"],
            ContentType::IMAGE
        ),
        MatchDecision::Allowed
    );
    assert_eq!(
        decision(&collection, url, &["https://other.org/"], ContentType::IMAGE),
        MatchDecision::Blocked
    );
}

#[test]
fn test_genericblock_keeps_domain_specific_filters() {
    let collection = single(
        "/banner/*$image\n\
         ||ads.net/banner$image,domain=example.com\n\
         @@||example.com^$genericblock",
    );
    let hierarchy = ["https://example.com/"];
    assert_eq!(
        decision(&collection, "https://ads.net/banner/1.png", &hierarchy, ContentType::IMAGE),
        MatchDecision::Blocked
    );
    assert_eq!(
        decision(&collection, "https://cdn.org/banner/2.png", &hierarchy, ContentType::IMAGE),
        MatchDecision::NoMatch
    );
    assert_eq!(
        decision(&collection, "https://cdn.org/banner/2.png", &["https://other.org/"], ContentType::IMAGE),
        MatchDecision::Blocked
    );
}

#[test]
fn test_popup_decisions() {
    let collection = single("||popup.example.com^$popup\n@@||popup.example.com/ok$popup");
    let opener = "https://news.test/";
    assert_eq!(
        collection.classify_popup("https://popup.example.com/x", opener, "").decision,
        MatchDecision::Blocked
    );
    assert_eq!(
        collection.classify_popup("https://popup.example.com/ok", opener, "").decision,
        MatchDecision::Allowed
    );
    // Popup filters never block subresources.
    assert_eq!(
        decision(&collection, "https://popup.example.com/x", &[], ContentType::SCRIPT),
        MatchDecision::NoMatch
    );
}

#[test]
fn test_csp_injection() {
    let collection = single("||example.com^$csp=script-src 'none'");
    let csp = collection.get_csp_injections("https://example.com/page", &[]);
    assert_eq!(csp.into_iter().collect::<Vec<_>>(), vec!["script-src 'none'".to_owned()]);
}

#[test]
fn test_csp_without_payload() {
    // A blocking filter without a payload is dropped at compile time.
    let empty = single("||example.com^$csp");
    assert!(empty.get_csp_injections("https://example.com/page", &[]).is_empty());

    let collection = collection(&[
        ("https://lists.test/block.txt", "||example.com^$csp=script-src 'none'"),
        ("https://lists.test/allow.txt", "@@||example.com/page$csp"),
    ]);
    assert!(collection.get_csp_injections("https://example.com/page", &[]).is_empty());
    assert_eq!(collection.get_csp_injections("https://example.com/other", &[]).len(), 1);
}

#[test]
fn test_csp_allow_with_payload_only_cancels_same_directive() {
    let collection = single(
        "||example.com^$csp=script-src 'none'\n\
         ||example.com^$csp=img-src 'none'\n\
         @@||example.com^$csp=img-src 'none'",
    );
    let csp = collection.get_csp_injections("https://example.com/", &[]);
    assert_eq!(csp.into_iter().collect::<Vec<_>>(), vec!["script-src 'none'".to_owned()]);
}

#[test]
fn test_rewrite() {
    let collection = single(
        "||cdn.example.com^$rewrite=abp-resource:blank-js,domain=example.com\n\
         ||cdn.example.com^$rewrite=abp-resource:no-such-thing,domain=other.org",
    );
    assert_eq!(
        collection.get_rewrite_url("https://cdn.example.com/lib.js", &["https://example.com/"]),
        Some("data:application/javascript,")
    );
    assert_eq!(
        collection.get_rewrite_url("https://cdn.example.com/lib.js", &["https://other.org/"]),
        None
    );
    assert_eq!(
        collection.get_rewrite_url("https://cdn.example.com/lib.js", &["https://third.test/"]),
        None
    );
}

#[test]
fn test_header_filters_and_responses() {
    let collection = single(
        "||api.example.com^$header=x-tracking=1\n\
         @@||api.example.com/public$header",
    );
    let hierarchy = ["https://example.com/"];
    let headers = [("X-Tracking", "1"), ("Content-Type", "application/json")];

    let blocked = collection.classify_response(
        "https://api.example.com/data",
        &hierarchy,
        ContentType::XMLHTTPREQUEST,
        &headers,
    );
    assert_eq!(blocked.decision, MatchDecision::Blocked);

    let allowed = collection.classify_response(
        "https://api.example.com/public/data",
        &hierarchy,
        ContentType::XMLHTTPREQUEST,
        &headers,
    );
    assert_eq!(allowed.decision, MatchDecision::Allowed);

    let absent = collection.classify_response(
        "https://api.example.com/data",
        &hierarchy,
        ContentType::XMLHTTPREQUEST,
        &[("X-Tracking", "2")],
    );
    assert_eq!(absent.decision, MatchDecision::NoMatch);
}

#[test]
fn test_element_hiding() {
    let collection = single(
        "##.ad-banner\n\
         example.com##.site-ad\n\
         example.com#@#.ad-banner\n\
         ~shop.example.com,example.com###sidebar",
    );

    let data = collection.get_element_hide_data("https://www.example.com/", &[], "");
    assert_eq!(data.elemhide_selectors, vec![".site-ad".to_owned(), "#sidebar".to_owned()]);
    assert!(data.elemhide_exceptions.is_empty());

    let shop = collection.get_element_hide_data("https://shop.example.com/", &[], "");
    assert_eq!(shop.elemhide_selectors, vec![".site-ad".to_owned()]);

    let other = collection.get_element_hide_data("https://other.org/", &[], "");
    assert_eq!(other.elemhide_selectors, vec![".ad-banner".to_owned()]);
}

#[test]
fn test_generichide_drops_generic_selectors() {
    let collection = single("##.ad-banner\nnews.test##.site-ad\n@@||news.test^$generichide");
    let data = collection.get_element_hide_data("https://news.test/", &["https://news.test/"], "");
    assert_eq!(data.elemhide_selectors, vec![".site-ad".to_owned()]);
}

#[test]
fn test_tld_wildcard_domains() {
    let collection = single("example.*###div");
    for url in [
        "https://example.com/",
        "https://example.org/",
        "https://example.com.br/",
        "https://www.example.com/",
    ] {
        let data = collection.get_element_hide_data(url, &[], "");
        assert_eq!(data.elemhide_selectors, vec!["#div".to_owned()], "{url}");
    }
    for url in [
        "https://example.evil/",
        "https://example.blogspot.com/",
        "https://notexample.com/",
    ] {
        let data = collection.get_element_hide_data(url, &[], "");
        assert!(data.elemhide_selectors.is_empty(), "{url}");
    }
}

#[test]
fn test_emulation_and_modifiers() {
    let collection = single(
        "example.com#?#div:-abp-has(.ad)\n\
         example.com#?#.x {remove: true;}\n\
         example.com#?#.y {color: red;}\n\
         example.com#@#.x",
    );
    let data = collection.get_element_hide_emulation_data("https://example.com/");
    assert_eq!(
        data,
        ContentFiltersData {
            elemhide_selectors: vec!["div:-abp-has(.ad)".to_owned()],
            elemhide_exceptions: Vec::new(),
            remove_selectors: Vec::new(),
            selectors_to_inline_css: vec![(".y".to_owned(), "color: red;".to_owned())],
        }
    );
}

#[test]
fn test_snippets() {
    let collection = single("example.com#$#log hello; hide-if-contains 'a b'\n~www.example.com,example.com#$#trace");
    let calls = collection.generate_snippets("https://www.example.com/", &[]);
    assert_eq!(
        calls,
        vec![
            SnippetCall {
                command: "log".to_owned(),
                arguments: vec!["hello".to_owned()],
            },
            SnippetCall {
                command: "hide-if-contains".to_owned(),
                arguments: vec!["a b".to_owned()],
            },
        ]
    );
    assert_eq!(collection.generate_snippets("https://example.com/", &[]).len(), 3);
}

#[test]
fn test_unprivileged_list_has_no_snippets() {
    let config = CompileConfig {
        source_url: "https://lists.test/community.txt".to_owned(),
        allow_privileged: false,
        require_header: false,
    };
    let bytes = compile("example.com#$#log hello", &config).index().expect("list should compile");
    let index = CompiledIndex::from_bytes(bytes).expect("snapshot should load");
    let subscription = InstalledSubscription::new(Arc::new(index), InstallationState::Installed, SystemTime::UNIX_EPOCH);
    assert!(subscription.match_snippets("example.com").is_empty());
}

#[test]
fn test_regex_cache_overflow_still_matches() {
    const CAPACITY: usize = 4;
    let text: Vec<String> = (0..=CAPACITY).map(|i| format!("/track{i}-[a-z]+/")).collect();
    let bytes = compile_list(&text.join("\n"), "https://lists.test/regex.txt");
    let index = Arc::new(CompiledIndex::from_bytes(bytes).expect("snapshot should load"));
    let subscription = Arc::new(InstalledSubscription::with_regex_cache(
        index,
        InstallationState::Installed,
        SystemTime::UNIX_EPOCH,
        Arc::new(RegexCache::new(CAPACITY)),
    ));
    assert_eq!(subscription.regex_cache().len(), CAPACITY);

    let collection = SubscriptionCollection::new(vec![subscription.clone()], "adblock");
    let url = format!("https://example.com/track{CAPACITY}-abc");
    assert_eq!(decision(&collection, &url, &[], ContentType::SCRIPT), MatchDecision::Blocked);
    assert_eq!(
        decision(&collection, "https://example.com/track9-abc", &[], ContentType::SCRIPT),
        MatchDecision::NoMatch
    );
    assert!(subscription.regex_cache().len() <= CAPACITY);
}

#[test]
fn test_lookaround_regex_filter() {
    let collection = single("/ad(?!min)/");
    assert_eq!(
        decision(&collection, "https://example.com/ad.js", &[], ContentType::SCRIPT),
        MatchDecision::Blocked
    );
    assert_eq!(
        decision(&collection, "https://example.com/admin", &[], ContentType::SCRIPT),
        MatchDecision::NoMatch
    );
}

#[test]
fn test_invalid_regex_is_ignored() {
    let collection = single("/[/\n||ads.example.com^");
    assert_eq!(collection.subscriptions()[0].compiled_index().snapshot().url_filter_count(), 1);
    assert_eq!(
        decision(&collection, "https://ads.example.com/x.js", &[], ContentType::SCRIPT),
        MatchDecision::Blocked
    );
}

#[test]
fn test_very_long_url() {
    let collection = single("example.com/aaaa\n||ads.example.com^");
    let url = format!("https://example.com/{}", "a".repeat(600_000));
    assert_eq!(decision(&collection, &url, &[], ContentType::SCRIPT), MatchDecision::Blocked);

    let other = format!("https://example.org/{}", "b".repeat(600_000));
    assert_eq!(decision(&collection, &other, &[], ContentType::SCRIPT), MatchDecision::NoMatch);
}

#[test]
fn test_empty_list_matches_nothing() {
    let collection = single("");
    assert_eq!(
        decision(&collection, "https://ads.example.com/x.js", &[], ContentType::SCRIPT),
        MatchDecision::NoMatch
    );
    assert!(collection.get_element_hide_data("https://example.com/", &[], "").elemhide_selectors.is_empty());
    assert!(collection.generate_snippets("https://example.com/", &[]).is_empty());
}

#[test]
fn test_compilation_is_idempotent() {
    let text = "[Adblock Plus 2.0]\n\
                ! Title: Sample\n\
                ||ads.example.com^$script,domain=a.com|~b.a.com\n\
                @@||ads.example.com/ok^\n\
                example.com,example.org##.ad\n\
                ##.banner-ad\n\
                a.com#$#log x\n\
                /track[0-9]+/";
    assert_eq!(compile_list(text, "https://lists.test/a.txt"), compile_list(text, "https://lists.test/a.txt"));
}

#[test]
fn test_subscription_metadata() {
    let subscription = install(
        "[Adblock Plus 2.0]\n\
         ! Title: EasyList\n\
         ! Version: 202108191113\n\
         ! Homepage: https://easylist.to/\n\
         ! Expires: 5 h\n\
         ||ads.example.com^",
        "https://lists.test/easylist.txt",
    );
    assert_eq!(subscription.source_url(), "https://lists.test/easylist.txt");
    assert_eq!(subscription.title(), "EasyList");
    assert_eq!(subscription.current_version(), "202108191113");
    assert_eq!(subscription.homepage(), "https://easylist.to/");
    assert_eq!(subscription.expiration_interval(), Duration::from_secs(5 * 3600));
}
