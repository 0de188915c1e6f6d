//! In-memory readers and writers shared by the engine's unit tests.
use std::cell::{Cell, RefCell};

use super::item::{restart_beyond_end, ItemReader, ItemReaderResult, ItemWriter, ItemWriterResult};
use crate::BatchError;

pub struct VecReader<T> {
    items: Vec<T>,
    next: Cell<usize>,
    fail_at: Option<usize>,
    reads: Cell<usize>,
    first_read: Cell<Option<usize>>,
}

impl<T: Clone> VecReader<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next: Cell::new(0),
            fail_at: None,
            reads: Cell::new(0),
            first_read: Cell::new(None),
        }
    }

    /// Makes the read of the item at `index` fail.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn get_reads(&self) -> usize {
        self.reads.get()
    }

    /// Index of the first item handed out by `read`.
    pub fn get_first_read(&self) -> Option<usize> {
        self.first_read.get()
    }
}

impl<T: Clone> ItemReader<T> for VecReader<T> {
    fn read(&self) -> ItemReaderResult<T> {
        let index = self.next.get();
        self.reads.set(self.reads.get() + 1);

        if self.fail_at == Some(index) {
            return Err(BatchError::ItemReader(format!("malformed item {}", index)));
        }

        match self.items.get(index) {
            Some(item) => {
                self.next.set(index + 1);
                if self.first_read.get().is_none() {
                    self.first_read.set(Some(index));
                }
                Ok(Some(item.clone()))
            }
            None => Ok(None),
        }
    }

    fn open(&self, position: usize) -> Result<(), BatchError> {
        if position > self.items.len() {
            return Err(restart_beyond_end(position, self.items.len()));
        }
        self.next.set(position);
        Ok(())
    }
}

pub struct VecWriter<T> {
    chunks: RefCell<Vec<Vec<T>>>,
    calls: Cell<usize>,
    fail_on_call: Option<usize>,
    opened_with: Cell<Option<usize>>,
}

impl<T> Default for VecWriter<T> {
    fn default() -> Self {
        Self {
            chunks: RefCell::new(Vec::new()),
            calls: Cell::new(0),
            fail_on_call: None,
            opened_with: Cell::new(None),
        }
    }
}

impl<T: Clone> VecWriter<T> {
    /// Makes the `call`-th write (1-based) fail without keeping its items.
    pub fn failing_on_call(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn get_calls(&self) -> usize {
        self.calls.get()
    }

    pub fn get_items(&self) -> Vec<T> {
        self.chunks.borrow().iter().flatten().cloned().collect()
    }

    pub fn get_opened_with(&self) -> Option<usize> {
        self.opened_with.get()
    }
}

impl<T: Clone> ItemWriter<T> for VecWriter<T> {
    fn write(&self, items: &[T]) -> ItemWriterResult {
        let call = self.calls.get() + 1;
        self.calls.set(call);

        if self.fail_on_call == Some(call) {
            return Err(BatchError::ItemWriter(format!("write {} refused", call)));
        }

        self.chunks.borrow_mut().push(items.to_vec());
        Ok(())
    }

    fn open(&self, committed: usize) -> ItemWriterResult {
        self.opened_with.set(Some(committed));
        Ok(())
    }
}
