use crate::budget::{budget_report, BudgetReport};
use crate::classifier::{build_result, ExtractionOutcome};
use crate::config::PipelineConfig;
use crate::error::{InvoiceError, Result};
use crate::extraction::ExtractionStrategy;
use crate::forecast::{CashflowForecast, CashflowForecaster};
use crate::ingestion::{IngestionGate, MediaType};
use crate::ledger::derive_ledger_entry;
use crate::ocr::{OcrEngine, PageRasterizer, TextRecovery};
use crate::reports::{expenses_by_tag, profit_and_loss, ProfitAndLoss, TagExpenseReport};
use crate::schema::{Budget, DateRange, ExtractionResult, InvoiceRecord, LedgerEntry, NewBudget};
use crate::store::InvoiceStore;
use chrono::{Local, NaiveDate};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Long-lived collaborators, created once at startup and shared by every document.
#[derive(Clone)]
pub struct PipelineServices {
    pub ocr: Arc<dyn OcrEngine>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub strategy: Arc<dyn ExtractionStrategy>,
    pub store: Arc<dyn InvoiceStore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    pub record: InvoiceRecord,
    pub ledger_entry: Option<LedgerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ocr_engine: String,
    pub extractor: String,
    pub store_reachable: bool,
}

pub struct DocumentProcessor {
    gate: IngestionGate,
    recovery: TextRecovery,
    strategy: Arc<dyn ExtractionStrategy>,
    store: Arc<dyn InvoiceStore>,
    forecaster: CashflowForecaster,
}

impl DocumentProcessor {
    pub fn new(config: PipelineConfig, services: PipelineServices) -> Self {
        info!(
            "Document processor ready: OCR engine {}, extractor {}",
            services.ocr.name(),
            services.strategy.name()
        );
        Self {
            gate: IngestionGate::new(&config.ingestion),
            recovery: TextRecovery::new(services.ocr, services.rasterizer, config.ocr.dpi),
            strategy: services.strategy,
            store: services.store,
            forecaster: CashflowForecaster::new(config.forecast),
        }
    }

    pub fn store(&self) -> &dyn InvoiceStore {
        self.store.as_ref()
    }

    /// Runs one document through OCR, extraction, classification and ledger derivation.
    ///
    /// Bad uploads and a failure to persist the initial record are returned as `Err`.
    /// Every later failure is recorded on the document with `Error` status instead.
    pub async fn process_document(
        &self,
        bytes: Vec<u8>,
        declared_mime: &str,
    ) -> Result<ProcessedDocument> {
        let media_type = self.gate.admit(&bytes, declared_mime)?;

        let text = match self.recovery.recover(Arc::new(bytes), media_type).await {
            Ok(text) => text,
            Err(e) => {
                error!("Text recovery failed: {}", e);
                let record = self
                    .store
                    .create_extraction_result(ExtractionResult::failed("", e.record_message()))
                    .await?;
                return Ok(ProcessedDocument {
                    record,
                    ledger_entry: None,
                });
            }
        };
        debug!("Recovered text:\n{}", text);

        let outcome = if text.is_empty() {
            warn!("OCR produced no text; skipping extraction");
            ExtractionOutcome::EmptyText
        } else {
            info!("Extracting fields with {}", self.strategy.name());
            match self.strategy.extract(&text).await {
                Ok(draft) => ExtractionOutcome::Extracted(draft),
                Err(e) => {
                    error!("Extraction failed: {}", e);
                    ExtractionOutcome::Failed(e)
                }
            }
        };

        // Record and ledger entry go to the store in one write.
        let today = Local::now().date_naive();
        let (record, ledger_entry) = self
            .store
            .create_invoice_with_entry(build_result(text, outcome), &|rec: &InvoiceRecord| {
                derive_ledger_entry(rec, today)
            })
            .await?;
        info!("Stored invoice {} as {}", record.id, record.status());

        Ok(ProcessedDocument {
            record,
            ledger_entry,
        })
    }

    /// Reads a file from disk and processes it, guessing the media type from its extension.
    pub async fn process_file(&self, path: impl AsRef<Path>) -> Result<ProcessedDocument> {
        let path = path.as_ref();
        let media_type = MediaType::from_path(path)?;
        let bytes = tokio::fs::read(path).await?;
        self.process_document(bytes, media_type.mime()).await
    }

    pub async fn create_budget(&self, budget: NewBudget) -> Result<Budget> {
        self.store.create_budget(budget).await
    }

    pub async fn budget_report(&self, period: &str) -> Result<BudgetReport> {
        budget_report(self.store.as_ref(), period).await
    }

    pub async fn profit_and_loss(&self, range: DateRange) -> Result<ProfitAndLoss> {
        if range.start > range.end {
            return Err(InvoiceError::InputError(format!(
                "start date {} is after end date {}",
                range.start, range.end
            )));
        }
        profit_and_loss(self.store.as_ref(), range).await
    }

    pub async fn add_tag(&self, entry_id: &str, tag: &str) -> Result<LedgerEntry> {
        self.store.add_tag(entry_id, tag).await
    }

    pub async fn expenses_by_tag(&self, tag: &str, range: DateRange) -> Result<TagExpenseReport> {
        expenses_by_tag(self.store.as_ref(), tag, range).await
    }

    /// Forecast starting today.
    pub async fn cashflow_forecast(&self, days_ahead: u32) -> Result<CashflowForecast> {
        self.cashflow_forecast_at(Local::now().date_naive(), days_ahead)
            .await
    }

    pub async fn cashflow_forecast_at(
        &self,
        today: NaiveDate,
        days_ahead: u32,
    ) -> Result<CashflowForecast> {
        self.forecaster
            .forecast_from(self.store.as_ref(), today, days_ahead)
            .await
    }

    pub async fn health(&self) -> HealthReport {
        let store_reachable = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store health check failed: {}", e);
                false
            }
        };
        HealthReport {
            ocr_engine: self.recovery.engine_name().to_string(),
            extractor: self.strategy.name().to_string(),
            store_reachable,
        }
    }

    /// Releases the shared clients. The processor cannot be used afterwards.
    pub fn shutdown(self) {
        info!("Shutting down document processor");
        self.recovery.release();
    }
}
