pub mod analysis;
pub mod checks;
pub mod config;
pub mod dictionary;
pub mod document;
pub mod extractor;
pub mod fathom;
pub mod history;
pub mod llm;
pub mod model;
pub mod publish;
pub mod report;
pub mod ruleset;

pub use analysis::{score_issues, Analyzer};
pub use checks::{CheckMatch, RuleChecker, CHECK_IDS};
pub use config::AppConfig;
pub use dictionary::Dictionary;
pub use document::{Document, DocumentKind};
pub use extractor::{CommentReceipt, DocumentSource, RoutingSource, SourceError};
pub use fathom::{FathomClient, FathomTranscript, WebhookPayload};
pub use history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
pub use llm::{build_client, LlmClient, LlmSettings, ProviderError, ProviderKind};
pub use model::{
    AnalysisResult, BanntScore, ConnectionCheck, DocumentType, Issue, IssueCategory, IssueSeverity, IssueSource,
    ScoreBreakdown,
};
pub use publish::{Notifier, PostReceipt, SlackNotifier, SlackSettings};
pub use report::{comment_body, render_report, OutputFormat, ProviderOutcome};
pub use ruleset::{
    file_repository::FileRulesetRepository, RequiredSection, Ruleset, RulesetRepository,
    RulesetValidationError, ScoringConfig,
};
