//! Symbol universe resolution.
//!
//! A [`SymbolSource`] yields raw ticker strings as published upstream.
//! [`normalize_tickers`] turns those into fetch keys.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{IngestError, Symbol};

pub const SP500_CONSTITUENTS_URL: &str =
    "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";

pub trait SymbolSource: Send + Sync {
    /// Human-readable origin for logs and reports.
    fn describe(&self) -> String;

    /// Raw tickers in source order.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::SymbolSource`] when the universe cannot be read
    /// or contains no tickers.
    fn symbols<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, IngestError>> + Send + 'a>>;
}

/// Fixed list, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticSymbolSource {
    tickers: Vec<String>,
}

impl StaticSymbolSource {
    pub fn new<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
        }
    }
}

impl SymbolSource for StaticSymbolSource {
    fn describe(&self) -> String {
        format!("static list ({} tickers)", self.tickers.len())
    }

    fn symbols<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, IngestError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.tickers.clone()) })
    }
}

/// Newline-delimited ticker file. Blank lines and `#` comments are ignored;
/// only the first comma or whitespace separated field of a line is used.
#[derive(Debug, Clone)]
pub struct FileSymbolSource {
    path: PathBuf,
}

impl FileSymbolSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SymbolSource for FileSymbolSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn symbols<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, IngestError>> + Send + 'a>> {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
                IngestError::SymbolSource(format!("cannot read {}: {e}", self.path.display()))
            })?;

            let tickers = parse_ticker_lines(content.as_str());
            if tickers.is_empty() {
                return Err(IngestError::SymbolSource(format!(
                    "{} lists no tickers",
                    self.path.display()
                )));
            }
            Ok(tickers)
        })
    }
}

fn parse_ticker_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            line.split(|ch: char| ch == ',' || ch.is_whitespace())
                .find(|field| !field.is_empty())
                .map(str::to_owned)
        })
        .collect()
}

/// First column of the first `wikitable` on a Wikipedia page; for the
/// default URL that is the current S&P 500 constituent list.
#[derive(Clone)]
pub struct WikipediaSymbolSource {
    http_client: Arc<dyn HttpClient>,
    url: String,
    request_timeout: Duration,
}

impl Default for WikipediaSymbolSource {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

impl WikipediaSymbolSource {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            url: String::from(SP500_CONSTITUENTS_URL),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl SymbolSource for WikipediaSymbolSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn symbols<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, IngestError>> + Send + 'a>> {
        Box::pin(async move {
            let request = HttpRequest::get(self.url.as_str())
                .with_header("accept", "text/html")
                .with_timeout(self.request_timeout);
            let response = self.http_client.execute(request).await.map_err(|e| {
                IngestError::SymbolSource(format!("{}: {}", self.url, e.message()))
            })?;

            if !response.is_success() {
                return Err(IngestError::SymbolSource(format!(
                    "{} returned status {}",
                    self.url, response.status
                )));
            }

            let tickers = extract_first_column(response.body.as_str())?;
            if tickers.is_empty() {
                return Err(IngestError::SymbolSource(format!(
                    "no wikitable rows found at {}",
                    self.url
                )));
            }
            Ok(tickers)
        })
    }
}

/// Text of the first cell of every body row in the first `wikitable`.
pub fn extract_first_column(html: &str) -> Result<Vec<String>, IngestError> {
    let table_open = compile(r#"(?is)<table[^>]*class="[^"]*\bwikitable\b[^"]*"[^>]*>"#)?;
    let first_cell = compile(r"(?is)<td[^>]*>(.*?)</td>")?;
    let tag = compile(r"(?s)<[^>]+>")?;

    let Some(open) = table_open.find(html) else {
        return Ok(Vec::new());
    };
    let body = &html[open.end()..];
    let body = body
        .find("</table>")
        .map_or(body, |close| &body[..close]);

    let tickers = body
        .split("<tr")
        .skip(1)
        .filter_map(|row| first_cell.captures(row))
        .filter_map(|captures| captures.get(1))
        .map(|cell| decode_entities(tag.replace_all(cell.as_str(), "").trim()))
        .filter(|ticker| !ticker.is_empty())
        .collect();

    Ok(tickers)
}

fn compile(pattern: &str) -> Result<Regex, IngestError> {
    Regex::new(pattern).map_err(|e| IngestError::SymbolSource(format!("bad pattern: {e}")))
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&#160;", " ")
        .replace("&nbsp;", " ")
        .trim()
        .to_owned()
}

/// Raw tickers turned into fetch keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedUniverse {
    /// Unique symbols in first-seen order.
    pub symbols: Vec<Symbol>,
    /// Raw tickers that are not valid symbols even after rewriting.
    pub rejected: Vec<String>,
}

/// Rewrite (`.` to `-`), validate and de-duplicate raw tickers.
pub fn normalize_tickers<I, S>(raw: I) -> ResolvedUniverse
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut resolved = ResolvedUniverse::default();

    for ticker in raw {
        let ticker = ticker.as_ref();
        match Symbol::from_ticker(ticker) {
            Ok(symbol) => {
                if seen.insert(symbol.clone()) {
                    resolved.symbols.push(symbol);
                }
            }
            Err(_) => resolved.rejected.push(ticker.to_owned()),
        }
    }

    resolved
}
