use std::sync::Arc;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

mod analysis;
mod apis;
mod config;
mod llm;
mod search;
mod service;
mod store;

use analysis::{AnalysisError, Analyzer};
use config::Config;
use llm::ollama::OllamaBackend;
use service::ResearchService;
use store::AnalysisStore;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchPapersParams {
    #[schemars(description = "Search query string")]
    query: String,
    #[schemars(description = "Page number, starting at 1 (default 1)")]
    page: Option<u32>,
    #[schemars(description = "Results per page (default 20, max 100)")]
    limit: Option<u32>,
    #[schemars(description = "Restrict to specific sources (e.g. [\"arxiv\"])")]
    sources: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PaperIdParams {
    #[schemars(description = "Paper ID, bare (Semantic Scholar) or prefixed (arxiv_ID, arxiv:ID, semantic_scholar_ID, s2:ID)")]
    id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StoredAnalysisParams {
    #[schemars(description = "Cross-source key of a stored paper, e.g. arxiv_2301.12345v1")]
    source_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RecentAnalysesParams {
    #[schemars(description = "Maximum analyses to return (default 10, max 100)")]
    limit: Option<u32>,
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ResearchHubServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    service: Arc<ResearchService>,
}

#[tool_router]
impl ResearchHubServer {
    pub async fn create() -> anyhow::Result<Self> {
        let config = Config::from_env();
        let client = config.http_client()?;
        let sources = config.build_sources(&client);

        let backend = OllamaBackend::new(
            client.clone(),
            config.ollama_url.clone(),
            config.ollama_model.clone(),
        )
        .with_timeout(config.ollama_timeout);
        let analyzer = Analyzer::new(Arc::new(backend), config.generation_concurrency);

        let store = match AnalysisStore::open(&config.db_path).await {
            Ok(store) => {
                tracing::info!("Analysis store ready at {}", store.path().display());
                Some(store)
            }
            Err(e) => {
                tracing::error!(
                    "Analysis store unavailable at {}: {}",
                    config.db_path.display(),
                    e
                );
                None
            }
        };

        tracing::info!(
            "Initialized {} paper sources, model={}, data_dir={}",
            sources.len(),
            config.ollama_model,
            config.data_dir.display()
        );

        Ok(Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            service: Arc::new(ResearchService::new(sources, analyzer, store)),
        })
    }

    #[tool(description = "List available paper sources and their status")]
    async fn list_sources(&self) -> Result<CallToolResult, McpError> {
        to_json(&self.config.source_status())
    }

    #[tool(description = "Search papers across Semantic Scholar and arXiv. Results are interleaved by source and deduplicated by title. total_estimate is approximate.")]
    async fn search_papers(
        &self,
        Parameters(params): Parameters<SearchPapersParams>,
    ) -> Result<CallToolResult, McpError> {
        let page = params.page.unwrap_or(1).max(1);
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let results = self
            .service
            .search(&params.query, page, limit, params.sources.as_deref())
            .await;
        to_json(&results)
    }

    #[tool(description = "Get metadata for a single paper by ID")]
    async fn get_paper(
        &self,
        Parameters(params): Parameters<PaperIdParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.service.get_paper_details(&params.id).await {
            Some(paper) => to_json(&paper),
            None => Err(McpError::invalid_params(
                format!("Paper not found: {}", params.id),
                None,
            )),
        }
    }

    #[tool(description = "Analyze a paper with the local language model and store the result")]
    async fn analyze_paper(
        &self,
        Parameters(params): Parameters<PaperIdParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.service.analyze(&params.id).await {
            Ok(analysis) => to_json(&analysis),
            Err(e @ AnalysisError::PaperNotFound(_)) => {
                Err(McpError::invalid_params(e.to_string(), None))
            }
            Err(e @ AnalysisError::Generation(_)) => Err(McpError::internal_error(
                format!("{} (retry later)", e),
                None,
            )),
        }
    }

    #[tool(description = "Check whether the language model backend is reachable")]
    async fn check_generation_health(&self) -> Result<CallToolResult, McpError> {
        to_json(&self.service.check_generation_health().await)
    }

    #[tool(description = "Get a stored analysis by its source_id")]
    async fn get_stored_analysis(
        &self,
        Parameters(params): Parameters<StoredAnalysisParams>,
    ) -> Result<CallToolResult, McpError> {
        let store = self.require_store()?;
        match store.fetch_by_source_id(&params.source_id).await {
            Some(stored) => to_json(&stored),
            None => Err(McpError::invalid_params(
                format!("No stored analysis for: {}", params.source_id),
                None,
            )),
        }
    }

    #[tool(description = "List the most recently stored analyses")]
    async fn list_recent_analyses(
        &self,
        Parameters(params): Parameters<RecentAnalysesParams>,
    ) -> Result<CallToolResult, McpError> {
        let store = self.require_store()?;
        let limit = params.limit.unwrap_or(10).clamp(1, 100);
        to_json(&store.list_recent(limit as usize).await)
    }

    #[tool(description = "Count stored analyses, in total and per source")]
    async fn analysis_stats(&self) -> Result<CallToolResult, McpError> {
        let store = self.require_store()?;
        to_json(&store.stats().await)
    }
}

impl ResearchHubServer {
    fn require_store(&self) -> Result<&AnalysisStore, McpError> {
        self.service.store().ok_or_else(|| {
            McpError::internal_error("Analysis store is not available".to_string(), None)
        })
    }
}

#[tool_handler]
impl ServerHandler for ResearchHubServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Discover research papers on Semantic Scholar and arXiv, analyze them \
                 with a local language model ({}), and keep the analyses in a local \
                 database.",
                self.service.model_id()
            )),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting research-hub MCP server");

    let server = ResearchHubServer::create().await?;
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
