//! Site Registry
//!
//! The approved documentation sites, loaded from a CSV table:
//!
//! ```text
//! domain,site,description
//! LangChain,docs.langchain.com,LangChain framework documentation
//! Rust,doc.rust-lang.org,The Rust book and standard library
//! ```
//!
//! `domain` is a topic label (may repeat), `site` a hostname (unique).

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use agent_core::tool::{AllowList, normalize_host};
use agent_core::{AgentError, Result};
use serde::{Deserialize, Serialize};

/// One approved site
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub domain: String,
    pub site: String,
    pub description: String,
}

impl SiteEntry {
    /// Lowercase words that tie a question to this entry
    fn keywords(&self) -> Vec<String> {
        let mut words: Vec<String> = tokenize(&self.domain)
            .into_iter()
            .filter(|w| !is_stopword(w))
            .collect();
        let squashed: String = words.concat();
        if words.len() > 1 {
            words.push(squashed);
        }
        if let Some(label) = host_keyword(&self.site) {
            if !words.contains(&label) {
                words.push(label);
            }
        }
        words
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    domain: Option<String>,
    site: Option<String>,
    description: Option<String>,
}

/// Process-wide, read-only table of approved sites
#[derive(Clone, Debug, Default)]
pub struct SiteRegistry {
    entries: Vec<SiteEntry>,
}

impl SiteRegistry {
    /// Load the table from a CSV file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            AgentError::Config(format!("cannot read site table {}: {e}", path.display()))
        })?;
        let registry = Self::from_reader(file)?;
        tracing::info!(path = %path.display(), sites = registry.len(), "loaded site registry");
        Ok(registry)
    }

    /// Parse the table from any reader
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv
            .headers()
            .map_err(|e| AgentError::Config(format!("unreadable site table header: {e}")))?
            .clone();
        for required in ["domain", "site", "description"] {
            if !headers.iter().any(|h| h.eq_ignore_ascii_case(required)) {
                return Err(AgentError::Config(format!(
                    "site table is missing the '{required}' column"
                )));
            }
        }
        let normalized: csv::StringRecord =
            headers.iter().map(str::to_ascii_lowercase).collect();
        csv.set_headers(normalized);

        let mut entries: Vec<SiteEntry> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (idx, row) in csv.deserialize::<Row>().enumerate() {
            // header is line 1
            let line = idx + 2;
            let row = row.map_err(|e| AgentError::Config(format!("site table line {line}: {e}")))?;

            let domain = row.domain.filter(|d| !d.is_empty()).ok_or_else(|| {
                AgentError::Config(format!("site table line {line}: missing domain"))
            })?;
            let raw_site = row.site.filter(|s| !s.is_empty()).ok_or_else(|| {
                AgentError::Config(format!("site table line {line}: missing site"))
            })?;
            let site = normalize_host(&raw_site).ok_or_else(|| {
                AgentError::Config(format!("site table line {line}: invalid site '{raw_site}'"))
            })?;

            if !seen.insert(site.clone()) {
                tracing::warn!(%site, line, "duplicate site in table, keeping first entry");
                continue;
            }

            entries.push(SiteEntry {
                domain,
                site,
                description: row.description.unwrap_or_default(),
            });
        }

        if entries.is_empty() {
            return Err(AgentError::Config("site table has no entries".into()));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SiteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct topic labels, in table order
    pub fn topics(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for e in &self.entries {
            if !out.iter().any(|d| d.eq_ignore_ascii_case(&e.domain)) {
                out.push(e.domain.clone());
            }
        }
        out
    }

    /// Topic labels the question is about
    pub fn match_topics(&self, query: &str) -> Vec<String> {
        let words: HashSet<String> = tokenize(query)
            .into_iter()
            .filter(|w| !is_stopword(w))
            .collect();

        let mut topics: Vec<String> = Vec::new();
        for entry in &self.entries {
            let hit = entry.keywords().iter().any(|k| words.contains(k));
            if hit && !topics.iter().any(|t| t.eq_ignore_ascii_case(&entry.domain)) {
                topics.push(entry.domain.clone());
            }
        }
        topics
    }

    /// Every site filed under one of `topics`
    pub fn restrict_domains<S: AsRef<str>>(&self, topics: &[S]) -> AllowList {
        AllowList::new(
            self.entries
                .iter()
                .filter(|e| topics.iter().any(|t| t.as_ref().eq_ignore_ascii_case(&e.domain)))
                .map(|e| e.site.as_str()),
        )
    }

    /// Allow-list for a question; empty when nothing matches
    pub fn scope_for(&self, query: &str) -> AllowList {
        self.restrict_domains(&self.match_topics(query))
    }

    /// Markdown listing for the oracle prompt, limited to `allowed`
    pub fn prompt_section(&self, allowed: &AllowList) -> String {
        let mut prompt = String::from("## Approved documentation sites\n\n");
        for e in self.entries.iter().filter(|e| allowed.contains_site(&e.site)) {
            let _ = write!(prompt, "- **{}** ({})", e.domain, e.site);
            if !e.description.is_empty() {
                let _ = write!(prompt, ": {}", e.description);
            }
            prompt.push('\n');
        }
        prompt
    }

    /// Reply for out-of-scope questions
    pub fn rejection_message(&self) -> String {
        format!(
            "I can only answer questions using the approved documentation for: {}. \
             Your question does not appear to relate to any of these sources.",
            self.topics().join(", ")
        )
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "get",
    "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or", "s", "so",
    "t", "that", "the", "this", "to", "up", "use", "using", "was", "we", "what", "when", "where",
    "which", "who", "why", "will", "with", "you", "your", "docs", "doc", "documentation",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Hosting labels that say nothing about the subject
const GENERIC_LABELS: &[&str] = &["github", "gitlab", "readthedocs", "netlify", "vercel", "pages"];

/// The label that names the project: `langchain` in `docs.langchain.com`,
/// `tokio-rs` in `tokio-rs.github.io`.
fn host_keyword(site: &str) -> Option<String> {
    let labels: Vec<&str> = site.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return labels.first().map(|l| l.to_lowercase());
    }
    let mut pick = labels[labels.len() - 2];
    if GENERIC_LABELS.contains(&pick) && labels.len() >= 3 {
        pick = labels[labels.len() - 3];
    }
    Some(pick.to_lowercase().replace('-', ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "domain,site,description\n\
        LangChain,docs.langchain.com,LangChain framework docs\n\
        LangChain,python.langchain.com,Python API reference\n\
        Rust,doc.rust-lang.org,The Rust book and std\n\
        Tokio,tokio.rs,Async runtime\n";

    fn registry() -> SiteRegistry {
        SiteRegistry::from_reader(TABLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_load_from_reader() {
        let reg = registry();
        assert_eq!(reg.len(), 4);
        assert_eq!(reg.topics(), vec!["LangChain", "Rust", "Tokio"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        let reg = SiteRegistry::load(file.path()).unwrap();
        assert_eq!(reg.entries()[0].site, "docs.langchain.com");
    }

    #[test]
    fn test_unreadable_source_is_config_error() {
        let err = SiteRegistry::load("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let missing_site = "domain,site,description\nLangChain,,docs\n";
        assert!(matches!(
            SiteRegistry::from_reader(missing_site.as_bytes()),
            Err(AgentError::Config(msg)) if msg.contains("line 2")
        ));

        let short_row = "domain,site,description\nLangChain\n";
        assert!(SiteRegistry::from_reader(short_row.as_bytes()).is_err());

        let missing_column = "domain,site\nLangChain,docs.langchain.com\n";
        assert!(SiteRegistry::from_reader(missing_column.as_bytes()).is_err());

        assert!(SiteRegistry::from_reader("domain,site,description\n".as_bytes()).is_err());
    }

    #[test]
    fn test_sites_normalized_and_deduplicated() {
        let table = "Domain,Site,Description\n\
            LangChain,https://docs.langchain.com/,a\n\
            Other,DOCS.langchain.com,b\n";
        let reg = SiteRegistry::from_reader(table.as_bytes()).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.entries()[0].domain, "LangChain");
        assert_eq!(reg.entries()[0].site, "docs.langchain.com");
    }

    #[test]
    fn test_scope_for_langchain_question() {
        let reg = registry();
        let scope = reg.scope_for("How do I create a LangChain agent with custom tools?");
        assert_eq!(
            scope.to_vec(),
            vec!["docs.langchain.com".to_string(), "python.langchain.com".to_string()]
        );
    }

    #[test]
    fn test_scope_matches_host_label() {
        let reg = registry();
        let scope = reg.scope_for("what does rust-lang say about lifetimes");
        assert_eq!(scope.to_vec(), vec!["doc.rust-lang.org".to_string()]);
        assert_eq!(reg.match_topics("Is tokio's select! fair?"), vec!["Tokio"]);
    }

    #[test]
    fn test_short_topic_names_match_exactly() {
        let table = "domain,site,description\nGo,go.dev,The Go language\nRust,doc.rust-lang.org,Rust\n";
        let reg = SiteRegistry::from_reader(table.as_bytes()).unwrap();
        assert_eq!(reg.match_topics("How do I write a Go module?"), vec!["Go"]);
        assert_eq!(reg.scope_for("go: generics").to_vec(), vec!["go.dev".to_string()]);
        assert!(reg.match_topics("Where is it going to be?").is_empty());
        assert!(reg.match_topics("I want a t-shirt").is_empty());
    }

    #[test]
    fn test_unrelated_question_has_empty_scope() {
        let reg = registry();
        assert!(reg.scope_for("What is the capital of France?").is_empty());
        assert!(reg.scope_for("").is_empty());
    }

    #[test]
    fn test_prompt_section_lists_only_allowed() {
        let reg = registry();
        let section = reg.prompt_section(&AllowList::new(["tokio.rs"]));
        assert!(section.contains("**Tokio** (tokio.rs): Async runtime"));
        assert!(!section.contains("langchain"));
        assert!(reg.rejection_message().contains("LangChain, Rust, Tokio"));
    }

    #[test]
    fn test_host_keyword() {
        assert_eq!(host_keyword("docs.langchain.com").as_deref(), Some("langchain"));
        assert_eq!(host_keyword("tokio-rs.github.io").as_deref(), Some("tokiors"));
        assert_eq!(host_keyword("doc.rust-lang.org").as_deref(), Some("rustlang"));
    }
}
