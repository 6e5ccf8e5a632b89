//! Request handling: parse PMIDs, build the combined block, then answer or
//! translate it. Owns the injected collaborators (abstract source, chat
//! model, cache) the way a request handler would.

mod errors;
pub mod format;

pub use errors::AppError;

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{Cache, Partition};
use crate::cli::{Cli, Command, GlobalOpts};
use crate::llm::{ChatModel, LlmError, OpenAiClient};
use crate::pubmed::{self, AbstractSource, PubMedClient};
use crate::qa;
use crate::translate::{self, FailurePolicy, Translation};

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout; chat requests override it per request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct AbstractsReport {
    pub pmids: Vec<String>,
    pub missing: Vec<String>,
    pub abstracts: String,
    pub abstracts_cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskReport {
    #[serde(flatten)]
    pub abstracts: AbstractsReport,
    pub question: String,
    pub answer: String,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateReport {
    #[serde(flatten)]
    pub abstracts: AbstractsReport,
    pub translation: Translation,
}

pub struct App<S, M> {
    source: S,
    model: Option<M>,
    cache: Cache,
}

impl App<PubMedClient, OpenAiClient> {
    pub fn from_env(http: Client, cache: Cache) -> Self {
        let model = OpenAiClient::from_env(http.clone())
            .inspect_err(|e| debug!("chat model not available: {e}"))
            .ok();
        Self::new(PubMedClient::new(http), model, cache)
    }
}

impl<S: AbstractSource, M: ChatModel> App<S, M> {
    pub fn new(source: S, model: Option<M>, cache: Cache) -> Self {
        Self {
            source,
            model,
            cache,
        }
    }

    fn model(&self) -> Result<&M, AppError> {
        self.model
            .as_ref()
            .ok_or(AppError::Llm(LlmError::ApiKeyNotSet))
    }

    pub async fn abstracts(&self, pmids_raw: &str) -> Result<AbstractsReport, AppError> {
        let pmids = pubmed::parse_pmids(pmids_raw);
        if pmids.is_empty() {
            return Err(AppError::NoPmids);
        }

        let combined = pubmed::combine(&self.source, &self.cache, &pmids).await?;
        let missing: Vec<String> = combined.missing().map(str::to_string).collect();
        if !missing.is_empty() {
            warn!(missing = ?missing, "skipping PMIDs without abstract");
        }

        Ok(AbstractsReport {
            abstracts_cached: combined.all_cached(),
            pmids,
            missing,
            abstracts: combined.text,
        })
    }

    pub async fn ask(&self, pmids_raw: &str, question: &str) -> Result<AskReport, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::EmptyQuestion);
        }
        let model = self.model()?;

        info!(pmids = pmids_raw, question, "command:ask");
        let abstracts = self.abstracts(pmids_raw).await?;
        if abstracts.abstracts.is_empty() {
            warn!("no abstracts found; asking without source text");
        }

        let answer = qa::answer(model, &self.cache, &abstracts.abstracts, question).await?;
        info!(cached = answer.cached, "ask complete");

        Ok(AskReport {
            abstracts,
            question: question.to_string(),
            answer: answer.text,
            cached: answer.cached,
        })
    }

    pub async fn translate(
        &self,
        pmids_raw: &str,
        policy: FailurePolicy,
    ) -> Result<TranslateReport, AppError> {
        let model = self.model()?;

        info!(pmids = pmids_raw, ?policy, "command:translate");
        let abstracts = self.abstracts(pmids_raw).await?;

        let translation =
            translate::translate(model, &self.cache, &abstracts.abstracts, policy).await?;
        info!(
            cached = translation.cached,
            units = translation.units.len(),
            "translate complete"
        );

        Ok(TranslateReport {
            abstracts,
            translation,
        })
    }
}

async fn open_cache(opts: &GlobalOpts) -> Result<Cache, AppError> {
    if opts.no_cache_file {
        return Ok(Cache::in_memory(opts.max_entries));
    }
    Ok(Cache::open(&opts.cache, opts.max_entries).await?)
}

fn render<T: Serialize>(
    json: bool,
    report: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<String, AppError> {
    if json {
        Ok(serde_json::to_string_pretty(report)?)
    } else {
        Ok(text(report))
    }
}

async fn dispatch<S: AbstractSource, M: ChatModel>(
    app: &App<S, M>,
    command: &Command,
    json: bool,
) -> Result<String, AppError> {
    match command {
        Command::Ask(args) => {
            let report = app.ask(&args.pmids, &args.question).await?;
            render(json, &report, format::format_answer)
        }
        Command::Translate(args) => {
            let policy = if args.strict {
                FailurePolicy::FailBatch
            } else {
                FailurePolicy::Placeholder
            };
            let report = app.translate(&args.pmids, policy).await?;
            render(json, &report, format::format_translation)
        }
        Command::Abstracts(args) => {
            let report = app.abstracts(&args.pmids).await?;
            render(json, &report, format::format_abstracts)
        }
    }
}

/// [`dispatch`] bounded by the request-level timeout of `secs` seconds.
async fn dispatch_with_timeout<S: AbstractSource, M: ChatModel>(
    app: &App<S, M>,
    command: &Command,
    json: bool,
    secs: u64,
) -> Result<String, AppError> {
    tokio::time::timeout(Duration::from_secs(secs), dispatch(app, command, json))
        .await
        .unwrap_or(Err(AppError::Timeout(secs)))
}

/// Runs one CLI command under the request-level timeout and returns the
/// rendered output.
pub async fn run(cli: &Cli) -> Result<String, AppError> {
    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(AppError::Client)?;
    let cache = open_cache(&cli.opts).await?;
    let app = App::from_env(http, cache);

    let output =
        dispatch_with_timeout(&app, &cli.command, cli.opts.json, cli.opts.timeout).await?;

    debug!(
        abstracts = app.cache.len(Partition::Abstracts).await,
        answers = app.cache.len(Partition::Answers).await,
        translations = app.cache.len(Partition::Translations).await,
        "cache size"
    );
    Ok(output)
}
