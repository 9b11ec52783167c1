use std::{path::PathBuf, sync::Arc};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    entry::Entry,
    error::{self, Error},
    orchestrator::{Outcome, ResponseOrchestrator, Status},
    retriever::RetrievalContext,
};

const DEFAULT_FIND_LIMIT: usize = 5;

struct VajraState {
    orchestrator: ResponseOrchestrator,
    data_dir: PathBuf,
}

#[derive(Clone)]
pub struct VajraMcpServer {
    state: Arc<VajraState>,
    tool_router: ToolRouter<Self>,
}

impl VajraMcpServer {
    pub fn new(orchestrator: ResponseOrchestrator, data_dir: PathBuf) -> Self {
        Self {
            state: Arc::new(VajraState {
                orchestrator,
                data_dir,
            }),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl VajraMcpServer {
    /// Answer a legal question grounded in the loaded corpora.
    #[tool(
        name = "vajra_ask",
        description = "Answer a question about Indian criminal law (BNS, BSA, BNSS) using retrieved sections as grounding. Not legal advice."
    )]
    pub async fn vajra_ask(
        &self,
        params: Parameters<AskParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let query = params.0.query;
        let answer = self.state.orchestrator.respond(&query).await;

        let structured = serde_json::to_value(AskResponse {
            query,
            outcome: answer.outcome,
            answer: answer.text.clone(),
            sections: answer.context.total_results(),
        })
        .map_err(|e| mcp_error("failed to serialize answer", e))?;

        let mut result = CallToolResult::default();
        result.content = vec![Content::text(answer.text)];
        result.structured_content = Some(structured);
        result.is_error = Some(answer.outcome == Outcome::GenerationFailed);
        Ok(result)
    }

    /// Retrieve the closest sections from every corpus without generating.
    #[tool(
        name = "vajra_search",
        description = "Retrieve the sections closest to a query from each corpus. Lower relevanceScore means more relevant."
    )]
    pub async fn vajra_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let orchestrator = &self.state.orchestrator;
        let k = params.limit.unwrap_or(orchestrator.settings().top_k).max(1);

        let context = orchestrator.retriever().search(&params.query, k).await;
        let corpora = corpus_hits(&context);
        let summary = format_search_summary(&corpora, &params.query);

        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            result_count: context.total_results(),
            corpora,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::default();
        result.content = vec![Content::text(summary)];
        result.structured_content = Some(structured);
        result.is_error = Some(false);
        Ok(result)
    }

    /// Substring lookup over section titles and descriptions.
    #[tool(
        name = "vajra_find",
        description = "Find sections whose title or description contains a term (case-insensitive). Optionally restrict to one corpus."
    )]
    pub async fn vajra_find(
        &self,
        params: Parameters<FindParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let limit = params.limit.unwrap_or(DEFAULT_FIND_LIMIT);

        let found = self
            .state
            .orchestrator
            .retriever()
            .find(&params.term, params.corpus.as_deref(), limit)
            .map_err(|e| match e {
                Error::NotFound { .. } => rmcp::ErrorData::invalid_params(
                    e.to_string(),
                    None,
                ),
                other => mcp_error("find failed", other),
            })?;

        let corpora: Vec<CorpusHits> = found
            .into_iter()
            .map(|(corpus, entries)| CorpusHits {
                corpus: corpus.name().to_string(),
                label: corpus.label().to_string(),
                sections: entries
                    .into_iter()
                    .map(|e| SectionItem::new(e, None))
                    .collect(),
            })
            .collect();
        let match_count = corpora.iter().map(|c| c.sections.len()).sum();

        let summary = if match_count == 0 {
            format!("No sections mention \"{}\"", params.term)
        } else {
            let mut lines = vec![format!(
                "Found {match_count} section(s) mentioning \"{}\":",
                params.term
            )];
            for group in &corpora {
                for s in &group.sections {
                    lines.push(format!(
                        "{} Section {} - {}",
                        group.label, s.section_number, s.section_title
                    ));
                }
            }
            lines.join("\n")
        };

        let structured = serde_json::to_value(FindResponse {
            term: params.term,
            match_count,
            corpora,
        })
        .map_err(|e| mcp_error("failed to serialize find results", e))?;

        let mut result = CallToolResult::default();
        result.content = vec![Content::text(summary)];
        result.structured_content = Some(structured);
        result.is_error = Some(false);
        Ok(result)
    }

    /// Loaded corpora and configured models.
    #[tool(
        name = "vajra_status",
        description = "Show the data directory, models and per-corpus section counts."
    )]
    pub async fn vajra_status(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        let status = self.state.orchestrator.status();
        let summary = format_status(&status);

        let structured = serde_json::to_value(StatusResponse {
            data_dir: self.state.data_dir.display().to_string(),
            status,
        })
        .map_err(|e| mcp_error("failed to serialize status", e))?;

        let mut result = CallToolResult::default();
        result.content = vec![Content::text(summary)];
        result.structured_content = Some(structured);
        result.is_error = Some(false);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for VajraMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::new("vajra", env!("CARGO_PKG_VERSION"));
        server_info.title = Some("VAJRA legal assistant".to_string());

        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = server_info;
        info.instructions = Some(
            "Use vajra_ask for grounded answers, vajra_search to inspect the retrieved sections, and vajra_find for exact term lookup. Answers are general information, not legal advice."
                .to_string(),
        );
        info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AskParams {
    /// The legal question, in any language.
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search query string.
    pub query: String,
    /// Results per corpus (default: retrieval.top_k).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindParams {
    /// Case-insensitive substring to look for.
    pub term: String,
    /// Restrict to a specific corpus name, e.g. "bns".
    pub corpus: Option<String>,
    /// Maximum matches per corpus (default: 5).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AskResponse {
    query: String,
    outcome: Outcome,
    answer: String,
    sections: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    result_count: usize,
    corpora: Vec<CorpusHits>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindResponse {
    term: String,
    match_count: usize,
    corpora: Vec<CorpusHits>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    data_dir: String,
    #[serde(flatten)]
    status: Status,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CorpusHits {
    corpus: String,
    label: String,
    sections: Vec<SectionItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SectionItem {
    section_number: String,
    section_title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    relevance_score: Option<f32>,
}

impl SectionItem {
    fn new(entry: &Entry, relevance_score: Option<f32>) -> Self {
        Self {
            section_number: entry.section_number.clone(),
            section_title: entry.section_title.clone(),
            description: entry.description.clone(),
            relevance_score,
        }
    }
}

fn corpus_hits(context: &RetrievalContext) -> Vec<CorpusHits> {
    context
        .groups()
        .iter()
        .map(|g| CorpusHits {
            corpus: g.corpus.clone(),
            label: g.label.clone(),
            sections: g
                .results
                .iter()
                .map(|r| SectionItem::new(&r.entry, Some(r.relevance_score)))
                .collect(),
        })
        .collect()
}

fn format_search_summary(corpora: &[CorpusHits], query: &str) -> String {
    let total: usize = corpora.iter().map(|c| c.sections.len()).sum();
    if total == 0 {
        return format!("No results found for \"{query}\"");
    }

    let suffix = if total == 1 { "" } else { "s" };
    let mut lines = vec![format!("Found {total} result{suffix} for \"{query}\":")];
    for group in corpora {
        for s in &group.sections {
            lines.push(format!(
                "{} Section {} - {} ({:.4})",
                group.label,
                s.section_number,
                s.section_title,
                s.relevance_score.unwrap_or_default()
            ));
        }
    }
    lines.join("\n")
}

fn format_status(status: &Status) -> String {
    let mut lines = vec![
        format!("Embedding model: {}", status.embedding_model),
        format!("Generation model: {}", status.generation_model),
    ];
    for c in &status.corpora {
        lines.push(format!("{} ({}): {} sections", c.label, c.name, c.sections));
    }
    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(
    orchestrator: ResponseOrchestrator,
    data_dir: PathBuf,
) -> error::Result<()> {
    let server = VajraMcpServer::new(orchestrator, data_dir);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
