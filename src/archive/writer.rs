use tracing::warn;

use crate::hubstorage::{HubResult, Item, ItemWriter};

/// Holds a collection writer for the duration of a run.
///
/// `finish` closes the writer and reports failures. If the guard is dropped
/// without `finish` (an error unwound the run) staged items are still flushed
/// and any failure is logged.
pub struct ScopedWriter<W: ItemWriter> {
    inner: Option<W>,
    collection: String,
}

impl<W: ItemWriter> ScopedWriter<W> {
    pub fn new(writer: W, collection: impl Into<String>) -> Self {
        Self {
            inner: Some(writer),
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn write(&mut self, item: &Item) -> HubResult<()> {
        match self.inner.as_mut() {
            Some(writer) => writer.write(item),
            None => Ok(()),
        }
    }

    pub fn flush(&mut self) -> HubResult<()> {
        match self.inner.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    pub fn finish(mut self) -> HubResult<()> {
        match self.inner.take() {
            Some(mut writer) => writer.close(),
            None => Ok(()),
        }
    }
}

impl<W: ItemWriter> Drop for ScopedWriter<W> {
    fn drop(&mut self) {
        let Some(mut writer) = self.inner.take() else {
            return;
        };
        if let Err(err) = writer.close() {
            warn!(
                collection = %self.collection,
                error = %err,
                "failed to flush staged items while releasing writer"
            );
        }
    }
}
