//! # Invoice Ledger Pipeline
//!
//! A library that turns scanned invoices (PDF, JPEG, PNG) into structured invoice records
//! and ledger entries, and derives budget, profit-and-loss and cashflow views from them.
//!
//! ## Core Concepts
//!
//! - **Ingestion**: uploads are checked for media type and size before any work is done
//! - **Text Recovery**: OCR runs per page (PDFs are rasterized first) and the text is concatenated in page order
//! - **Extraction Strategies**: an AI strategy (language model with self-review) or a rule-based fallback
//! - **Classification**: every document ends as `Processed`, `Needs Review` or `Error`
//! - **Ledger**: only `Processed` invoices with a total amount post a (Debit) ledger entry
//! - **Reports**: budget vs. actual, profit and loss, spend by tag, and an approximate cashflow forecast
//!
//! Collaborators (OCR engine, PDF rasterizer, language model, store) are traits injected
//! through [`PipelineServices`]. [`MemoryStore`] is a complete in-memory store.
//!
//! ## Example
//!
//! ```rust,ignore
//! use invoice_ledger_pipeline::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::from_env();
//! let services = PipelineServices {
//!     ocr: Arc::new(MyOcrEngine::load()?),
//!     rasterizer: Arc::new(MyPdfRasterizer),
//!     strategy: Arc::new(RuleBasedStrategy::new()),
//!     store: Arc::new(MemoryStore::new()),
//! };
//! let processor = DocumentProcessor::new(config, services);
//!
//! let bytes = std::fs::read("invoice.pdf")?;
//! let processed = processor.process_document(bytes, "application/pdf").await?;
//! println!("{} -> {}", processed.record.id, processed.record.status());
//!
//! let forecast = processor.cashflow_forecast(30).await?;
//! processor.shutdown();
//! ```

pub mod budget;
pub mod chart_of_accounts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extraction;
pub mod forecast;
pub mod ingestion;
pub mod ledger;
pub mod ocr;
pub mod pipeline;
pub mod reports;
pub mod schema;
pub mod store;
pub mod utils;

#[cfg(feature = "gemini")]
pub mod llm;

pub use budget::{budget_report, compute_variance, BudgetLine, BudgetReport};
pub use chart_of_accounts::{account_class, categorize_vendor, AccountClass, GlAccountRule};
pub use classifier::{build_result, classify, Classification, ExtractionOutcome};
pub use config::{ForecastConfig, IngestionConfig, LlmConfig, OcrConfig, PipelineConfig};
pub use error::{InvoiceError, Result};
pub use extraction::{
    AiExtractionStrategy, AiInvoiceResponse, ExtractionDraft, ExtractionStrategy,
    GenerationSettings, LanguageModel, RuleBasedStrategy, SafetySetting,
};
pub use forecast::{CashflowForecast, CashflowForecaster};
pub use ingestion::{IngestionGate, MediaType};
pub use ledger::derive_ledger_entry;
pub use ocr::{
    BoundingBox, OcrDetection, OcrEngine, PageRasterizer, TextRecovery, UnavailableRasterizer,
};
pub use pipeline::{DocumentProcessor, HealthReport, PipelineServices, ProcessedDocument};
pub use reports::{ProfitAndLoss, TagExpenseReport};
pub use schema::*;
pub use store::{InvoiceStore, MemoryStore};
pub use utils::parse_period_string;

#[cfg(feature = "gemini")]
pub use llm::GeminiClient;
