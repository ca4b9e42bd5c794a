use crate::collections::ImageCollection;
use crate::domain::{DocKey, Document};
use crate::error::{Error, Result};

/// Forward-only, batched enumeration of an image collection.
///
/// Resumes each fetch after the last key it has yielded, so records deleted
/// behind the cursor never shift what comes next. Fused after the first
/// short batch or error.
pub struct ImageCursor<'a, C: ImageCollection + ?Sized> {
    images: &'a C,
    batch_size: usize,
    last_key: Option<DocKey>,
    done: bool,
}

impl<'a, C: ImageCollection + ?Sized> ImageCursor<'a, C> {
    pub fn open(images: &'a C, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize(batch_size));
        }
        Ok(Self {
            images,
            batch_size,
            last_key: None,
            done: false,
        })
    }
}

impl<C: ImageCollection + ?Sized> Iterator for ImageCursor<'_, C> {
    type Item = Result<Vec<Document>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let batch = match self.images.fetch_batch(self.last_key, self.batch_size) {
            Ok(batch) => batch,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if batch.len() < self.batch_size {
            self.done = true;
        }
        match batch.last() {
            Some(last) => {
                self.last_key = Some(last.key);
                Some(Ok(batch))
            }
            None => None,
        }
    }
}
