//! The query workflow: question in, evidence-backed answer out.
//!
//! A query runs through six fixed stages, each a function that takes the
//! [`QueryState`] by value and returns it advanced:
//!
//! ```text
//! AnalyzeQuery → Retrieve → ResolveRefs → BuildContext → GenerateAnswer → FormatResponse
//! ```
//!
//! A stage either succeeds or fails the whole query with a classified
//! [`RetrievalError`]. Two conditions are absorbed instead of failing:
//! a generation provider that is missing, unreachable or too slow yields an
//! extractive answer (`used_fallback = true`), and a query with no hits
//! short-circuits to a `no_evidence` result.
//!
//! The workflow holds only shared, read-only dependencies. Every call to
//! [`QueryWorkflow::run_query`] creates its own state, so one workflow can
//! serve concurrent queries.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::{build_context, owning_section, ContextBlock, ContextOptions};
use crate::embedding::EmbeddingClient;
use crate::error::{RetrievalError, RetrievalResult};
use crate::generation::GenerationProvider;
use crate::models::{CorpusItem, ItemId, ItemKind, SearchFilter};
use crate::references::{resolve_references, Direction, ResolvedReference};
use crate::search::{retrieve, RetrievalOutcome, SearchParams, SearchType};
use crate::store::CorpusStore;

/// Answer text used when retrieval finds nothing.
pub const NO_EVIDENCE_ANSWER: &str =
    "No relevant sections were found for this question. Try rephrasing it or using different terms.";

/// Per-query options supplied by the caller.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub search_type: SearchType,
    /// Number of hits returned in the result.
    pub max_hits: usize,
    /// Run BuildContext (ancestor/descendant expansion).
    pub include_context: bool,
    /// Run ResolveRefs.
    pub include_references: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            search_type: SearchType::Hybrid,
            max_hits: 5,
            include_context: true,
            include_references: true,
        }
    }
}

impl QueryOptions {
    pub fn validate(&self) -> RetrievalResult<()> {
        if self.max_hits == 0 {
            return Err(RetrievalError::invalid("max_hits must be at least 1"));
        }
        Ok(())
    }
}

/// Settings shared by every query a workflow runs.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub search: SearchParams,
    /// Hits passed to ResolveRefs, BuildContext and the answer.
    pub context_top_n: usize,
    pub generation_timeout: Duration,
    /// Citation URL template containing `{page}`. No URLs when unset.
    pub citation_url_template: Option<String>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            search: SearchParams::default(),
            context_top_n: 5,
            generation_timeout: Duration::from_secs(30),
            citation_url_template: None,
        }
    }
}

/// Coarse question type; only changes the prompt framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    #[default]
    Factual,
    Procedural,
    Comparison,
}

impl QueryIntent {
    pub fn classify(question: &str) -> Self {
        let lower = question.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let comparison = words.iter().any(|w| {
            w.starts_with("differ") || w.starts_with("compar") || *w == "vs" || *w == "versus"
        });
        if comparison {
            return QueryIntent::Comparison;
        }
        let procedural = words.iter().any(|w| {
            *w == "how"
                || *w == "step"
                || *w == "steps"
                || w.starts_with("procedur")
                || w.starts_with("process")
        });
        if procedural {
            QueryIntent::Procedural
        } else {
            QueryIntent::Factual
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Factual => "factual",
            QueryIntent::Procedural => "procedural",
            QueryIntent::Comparison => "comparison",
        }
    }

    fn framing(&self) -> &'static str {
        match self {
            QueryIntent::Factual => "Answer the question directly and concisely.",
            QueryIntent::Procedural => {
                "Describe the required steps in order, citing the section for each step."
            }
            QueryIntent::Comparison => {
                "Compare the provisions side by side and state where they differ."
            }
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the answer text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    #[default]
    Generated,
    /// Concatenated hit text; the generation provider was not used.
    Extractive,
    /// Retrieval found nothing.
    NoEvidence,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Generated => "generated",
            QueryStatus::Extractive => "extractive",
            QueryStatus::NoEvidence => "no_evidence",
        }
    }
}

/// One retrieved item as presented to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitSummary {
    pub item_id: ItemId,
    pub kind: ItemKind,
    /// The item's section number; for tables and figures, the owning section's.
    pub section_number: String,
    pub title: String,
    pub score: f64,
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Retrieval counts reported with every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryMetadata {
    pub vector_candidates: usize,
    pub keyword_candidates: usize,
    pub fused_hits: usize,
    pub context_hits: usize,
}

/// The packaged answer returned by [`QueryWorkflow::run_query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub question: String,
    pub answer: String,
    pub used_fallback: bool,
    pub status: QueryStatus,
    pub intent: QueryIntent,
    pub strategy: SearchType,
    pub hits: Vec<HitSummary>,
    pub references: BTreeMap<ItemId, Vec<ResolvedReference>>,
    pub context_expansions: BTreeMap<ItemId, ContextBlock>,
    pub metadata: QueryMetadata,
}

impl QueryResult {
    /// The answer followed by a "References" section.
    ///
    /// Lists cited hits (one line per section number), then resolved
    /// references, then external "see also" text.
    pub fn to_markdown(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for hit in &self.hits {
            if !seen.insert(format!("section:{}", hit.section_number)) {
                continue;
            }
            let mut line = if hit.title.is_empty() || hit.kind != ItemKind::Section {
                format!("- Section {}", hit.section_number)
            } else {
                format!("- Section {} ({})", hit.section_number, hit.title)
            };
            if let Some(url) = &hit.url {
                line.push_str(&format!(" <{}>", url));
            }
            lines.push(line);
        }

        let mut external = Vec::new();
        for reference in self.references.values().flatten() {
            match &reference.item {
                Some(item) => {
                    let key = format!("{}:{}", item.kind, item.number);
                    if item.kind == ItemKind::Section
                        && seen.contains(&format!("section:{}", item.number))
                    {
                        continue;
                    }
                    if seen.insert(key) {
                        lines.push(format!("- {}", item.label()));
                    }
                }
                None => {
                    if seen.insert(format!("external:{}", reference.reference_text)) {
                        external.push(format!("- See also: {}", reference.reference_text));
                    }
                }
            }
        }
        lines.extend(external);

        if lines.is_empty() {
            return self.answer.clone();
        }
        format!("{}\n\n## References\n\n{}\n", self.answer, lines.join("\n"))
    }
}

/// Everything one query accumulates on its way through the stages.
///
/// Owned by a single [`QueryWorkflow::run_query`] call and dropped once
/// the result is formatted.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub question: String,
    pub intent: QueryIntent,
    pub strategy: SearchType,
    pub max_hits: usize,
    pub include_context: bool,
    pub include_references: bool,
    pub retrieval: RetrievalOutcome,
    /// Corpus items for `retrieval.hits`, in hit order.
    pub hit_items: Vec<CorpusItem>,
    pub references: BTreeMap<ItemId, Vec<ResolvedReference>>,
    pub context: BTreeMap<ItemId, ContextBlock>,
    pub context_text: String,
    pub answer: String,
    pub status: QueryStatus,
    pub used_fallback: bool,
    /// Cited section number per entry of `hit_items`. Tables and figures
    /// cite their owning section.
    pub section_numbers: Vec<String>,
}

impl QueryState {
    pub fn new(question: &str, options: &QueryOptions) -> Self {
        Self {
            question: question.trim().to_string(),
            strategy: options.search_type,
            max_hits: options.max_hits,
            include_context: options.include_context,
            include_references: options.include_references,
            ..Self::default()
        }
    }

    fn has_evidence(&self) -> bool {
        !self.retrieval.hits.is_empty()
    }
}

/// Sequences the query stages over shared, read-only dependencies.
pub struct QueryWorkflow<'a, S: CorpusStore + ?Sized> {
    store: &'a S,
    embedder: &'a EmbeddingClient,
    generator: Option<&'a dyn GenerationProvider>,
    settings: WorkflowSettings,
}

impl<'a, S: CorpusStore + ?Sized> QueryWorkflow<'a, S> {
    pub fn new(store: &'a S, embedder: &'a EmbeddingClient, settings: WorkflowSettings) -> Self {
        Self {
            store,
            embedder,
            generator: None,
            settings,
        }
    }

    /// Use `generator` for GenerateAnswer. Without one, answers are extractive.
    pub fn with_generator(mut self, generator: Option<&'a dyn GenerationProvider>) -> Self {
        self.generator = generator;
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Run every stage for `question` and package the result.
    pub async fn run_query(
        &self,
        question: &str,
        options: &QueryOptions,
    ) -> RetrievalResult<QueryResult> {
        options.validate()?;

        let state = QueryState::new(question, options);
        let state = self.analyze_query(state);
        let state = self.retrieve(state).await?;
        let state = if state.has_evidence() {
            let state = self.resolve_refs(state).await?;
            let state = self.build_context(state).await?;
            self.generate_answer(state).await?
        } else {
            no_evidence(state)
        };
        Ok(self.format_response(state))
    }

    /// AnalyzeQuery: classify intent. The strategy was fixed from the options.
    pub fn analyze_query(&self, mut state: QueryState) -> QueryState {
        state.intent = QueryIntent::classify(&state.question);
        debug!(intent = %state.intent, strategy = %state.strategy, "analyzed query");
        state
    }

    /// Retrieve: search, fuse, and load the hit items.
    pub async fn retrieve(&self, mut state: QueryState) -> RetrievalResult<QueryState> {
        state.retrieval = retrieve(
            self.store,
            self.embedder,
            &state.question,
            state.strategy,
            state.max_hits,
            &SearchFilter::default(),
            &self.settings.search,
        )
        .await?;

        let mut items = Vec::with_capacity(state.retrieval.hits.len());
        let mut section_numbers = Vec::with_capacity(state.retrieval.hits.len());
        for hit in &state.retrieval.hits {
            let item = self.store.get_item(hit.item_id).await?.ok_or_else(|| {
                RetrievalError::integrity(format!(
                    "search returned item {} which does not exist",
                    hit.item_id
                ))
            })?;
            let number = match owning_section(self.store, &item).await? {
                Some(owner) => owner.number,
                None => item.number.clone(),
            };
            section_numbers.push(number);
            items.push(item);
        }
        state.hit_items = items;
        state.section_numbers = section_numbers;

        info!(
            strategy = %state.strategy,
            hits = state.retrieval.hits.len(),
            "retrieved evidence"
        );
        Ok(state)
    }

    /// ResolveRefs: cross-references of the top-N hits.
    pub async fn resolve_refs(&self, mut state: QueryState) -> RetrievalResult<QueryState> {
        if !state.include_references {
            return Ok(state);
        }
        let top = self.top_hits(&state);
        state.references = resolve_references(self.store, &state.retrieval.hits[..top]).await?;
        Ok(state)
    }

    /// BuildContext: ancestors and descendants of the top-N hits.
    pub async fn build_context(&self, mut state: QueryState) -> RetrievalResult<QueryState> {
        if !state.include_context {
            return Ok(state);
        }
        let top = self.top_hits(&state);
        state.context = build_context(
            self.store,
            &state.retrieval.hits[..top],
            ContextOptions::default(),
        )
        .await?;
        Ok(state)
    }

    /// GenerateAnswer: assemble the context and ask the provider, or fall
    /// back to an extractive answer.
    pub async fn generate_answer(&self, mut state: QueryState) -> RetrievalResult<QueryState> {
        let top = self.top_hits(&state);
        state.context_text = assemble_context(&state.hit_items[..top], &state.context, &state.references);

        let generated = match self.generator {
            Some(generator) => {
                let prompt = build_prompt(&state.question, state.intent, &state.context_text);
                match generator
                    .generate(&prompt, self.settings.generation_timeout)
                    .await
                {
                    Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
                    Ok(_) => {
                        warn!(model = generator.model_name(), "empty completion; using extractive answer");
                        None
                    }
                    Err(err) if err.is_recoverable() => {
                        warn!(
                            model = generator.model_name(),
                            kind = err.kind(),
                            error = %err,
                            "generation failed; using extractive answer"
                        );
                        None
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                debug!("no generation provider configured; using extractive answer");
                None
            }
        };

        match generated {
            Some(answer) => {
                state.answer = answer;
                state.status = QueryStatus::Generated;
                state.used_fallback = false;
            }
            None => {
                state.answer = extractive_answer(&state.hit_items[..top]);
                state.status = QueryStatus::Extractive;
                state.used_fallback = true;
            }
        }
        Ok(state)
    }

    /// FormatResponse: package the state. Terminal.
    pub fn format_response(&self, state: QueryState) -> QueryResult {
        let template = self.settings.citation_url_template.as_deref();
        let hits: Vec<HitSummary> = state
            .retrieval
            .hits
            .iter()
            .zip(&state.hit_items)
            .zip(&state.section_numbers)
            .map(|((hit, item), section_number)| HitSummary {
                item_id: hit.item_id,
                kind: hit.kind,
                section_number: section_number.clone(),
                title: item.title.clone(),
                score: hit.score,
                rank: hit.rank,
                url: citation_url(template, item.page.as_deref()),
            })
            .collect();

        let metadata = QueryMetadata {
            vector_candidates: state.retrieval.vector_hits.len(),
            keyword_candidates: state.retrieval.keyword_hits.len(),
            fused_hits: state.retrieval.hits.len(),
            context_hits: state.context.len(),
        };

        info!(
            status = state.status.as_str(),
            hits = hits.len(),
            used_fallback = state.used_fallback,
            "query complete"
        );

        QueryResult {
            question: state.question,
            answer: state.answer,
            used_fallback: state.used_fallback,
            status: state.status,
            intent: state.intent,
            strategy: state.strategy,
            hits,
            references: state.references,
            context_expansions: state.context,
            metadata,
        }
    }

    fn top_hits(&self, state: &QueryState) -> usize {
        self.settings
            .context_top_n
            .max(1)
            .min(state.retrieval.hits.len())
    }
}

fn no_evidence(mut state: QueryState) -> QueryState {
    info!(question = %state.question, "no evidence found");
    state.answer = NO_EVIDENCE_ANSWER.to_string();
    state.status = QueryStatus::NoEvidence;
    state.used_fallback = false;
    state
}

/// Substitute `page` into `template`. `None` when either is missing.
pub fn citation_url(template: Option<&str>, page: Option<&str>) -> Option<String> {
    match (template, page) {
        (Some(template), Some(page)) if !page.is_empty() => {
            Some(template.replace("{page}", page))
        }
        _ => None,
    }
}

/// Top hit texts joined by blank lines, skipping empty text.
pub fn extractive_answer(items: &[CorpusItem]) -> String {
    items
        .iter()
        .map(|item| item.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Hit text, then ancestors, then descendants, then references.
///
/// Each item appears at most once.
fn assemble_context(
    hits: &[CorpusItem],
    context: &BTreeMap<ItemId, ContextBlock>,
    references: &BTreeMap<ItemId, Vec<ResolvedReference>>,
) -> String {
    let mut included: HashSet<ItemId> = HashSet::new();
    let mut chunks: Vec<String> = Vec::new();
    let mut push = |item: &CorpusItem, chunks: &mut Vec<String>| {
        if included.insert(item.id) {
            chunks.push(format!("{}\n{}", item.label(), item.text.trim()));
        }
    };

    for item in hits {
        push(item, &mut chunks);
    }
    for item in hits {
        if let Some(block) = context.get(&item.id) {
            for ancestor in &block.ancestors {
                push(ancestor, &mut chunks);
            }
        }
    }
    for item in hits {
        if let Some(block) = context.get(&item.id) {
            for child in &block.descendants {
                push(child, &mut chunks);
            }
        }
    }

    let mut reference_lines = Vec::new();
    for item in hits {
        for reference in references.get(&item.id).into_iter().flatten() {
            let line = match (&reference.item, reference.direction) {
                (Some(other), Direction::Outgoing) => {
                    format!("{} references {}", item.label(), other.label())
                }
                (Some(other), Direction::Incoming) => {
                    format!("{} is referenced by {}", item.label(), other.label())
                }
                (None, _) => format!("{} cites {}", item.label(), reference.reference_text),
            };
            reference_lines.push(line);
            if let Some(other) = &reference.item {
                push(other, &mut chunks);
            }
        }
    }
    if !reference_lines.is_empty() {
        chunks.push(format!("References:\n{}", reference_lines.join("\n")));
    }

    chunks.join("\n\n")
}

fn build_prompt(question: &str, intent: QueryIntent, context: &str) -> String {
    format!(
        "You are an expert on the documents below. Answer the question using only the provided context. {}\n\
         Mention the relevant section numbers.\n\n\
         Question: {}\n\n\
         Context:\n{}",
        intent.framing(),
        question,
        context
    )
}
