use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    logging::{LogLevel, Logger},
    store::StationStore,
};

/// Writes every resolver event twice: as a structured JSON line and as a
/// human-readable line in the log store.
#[derive(Clone)]
pub struct Journal {
    logger: Logger,
    store: Arc<StationStore>,
    run_id: Option<Arc<str>>,
}

impl Journal {
    pub fn new(logger: Logger, store: Arc<StationStore>) -> Self {
        Self {
            logger,
            store,
            run_id: None,
        }
    }

    /// Copy of this journal that tags structured lines with `runId`.
    pub fn for_run(&self, run_id: &str) -> Self {
        Self {
            run_id: Some(Arc::from(run_id)),
            ..self.clone()
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub async fn record(&self, level: LogLevel, event: &str, message: String, context: Value) {
        let mut fields = match context {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("context".into(), other);
                map
            }
        };
        if let Some(run_id) = &self.run_id {
            fields.insert("runId".into(), Value::String(run_id.to_string()));
        }
        fields.insert("message".into(), Value::String(message.clone()));
        self.logger.log(level, event, Value::Object(fields));
        self.store.append(&message).await;
    }

    pub async fn info(&self, event: &str, message: String, context: Value) {
        self.record(LogLevel::Info, event, message, context).await;
    }

    pub async fn warn(&self, event: &str, message: String, context: Value) {
        self.record(LogLevel::Warn, event, message, context).await;
    }

    pub async fn error(&self, event: &str, message: String, context: Value) {
        self.record(LogLevel::Error, event, message, context).await;
    }
}
