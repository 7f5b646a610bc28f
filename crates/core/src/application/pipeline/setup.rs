// Queue Setup - immutable description of one queue pipeline

use crate::domain::{validate_queue_name, QueuePriority};
use crate::error::{AppError, Result};
use crate::port::Processor;
use std::sync::Arc;

/// Produces a fresh processor for every new scale unit
pub type ProcessorFactory<T> = Arc<dyn Fn() -> Arc<dyn Processor<T>> + Send + Sync>;

/// Everything the pipeline factory needs to wire one queue
pub struct QueueSetup<T> {
    name: String,
    connection: Option<String>,
    priority: QueuePriority,
    processor_factory: ProcessorFactory<T>,
}

impl<T> QueueSetup<T> {
    pub fn builder(name: impl Into<String>) -> QueueSetupBuilder<T> {
        QueueSetupBuilder {
            name: name.into(),
            connection: None,
            priority: QueuePriority::default(),
            processor_factory: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection override; `None` means the factory's connection
    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    pub fn priority(&self) -> QueuePriority {
        self.priority
    }

    pub fn processor_factory(&self) -> ProcessorFactory<T> {
        Arc::clone(&self.processor_factory)
    }
}

impl<T> std::fmt::Debug for QueueSetup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSetup")
            .field("name", &self.name)
            .field("connection", &self.connection)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

pub struct QueueSetupBuilder<T> {
    name: String,
    connection: Option<String>,
    priority: QueuePriority,
    processor_factory: Option<ProcessorFactory<T>>,
}

impl<T> QueueSetupBuilder<T> {
    pub fn priority(mut self, priority: QueuePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn processor_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Processor<T>> + Send + Sync + 'static,
    {
        self.processor_factory = Some(Arc::new(factory));
        self
    }

    /// Share an existing factory handle
    pub fn shared_processor_factory(mut self, factory: ProcessorFactory<T>) -> Self {
        self.processor_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<QueueSetup<T>> {
        validate_queue_name(&self.name)?;
        if matches!(&self.connection, Some(c) if c.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "queue '{}' has an empty connection override",
                self.name
            )));
        }
        let processor_factory = self.processor_factory.ok_or_else(|| {
            AppError::Config(format!("queue '{}' requires a processor factory", self.name))
        })?;

        Ok(QueueSetup {
            name: self.name,
            connection: self.connection,
            priority: self.priority,
            processor_factory,
        })
    }
}
