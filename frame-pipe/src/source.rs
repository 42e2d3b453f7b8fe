//! Pull contract shared by every pipeline stage.
//!
//! A stage hands out one item per `read` together with a [`Release`] guard.
//! The item's backing buffer belongs to the producing stage until the guard
//! is released or dropped, and callers must not hold on to borrowed pixel
//! data past that point. Transforms wrap an upstream [`Source`] and return
//! a new one; they call their upstream exactly once per own `read` and pass
//! errors through unchanged.

use std::time::Duration;

use crate::{
    clock::SystemClock,
    convert::Normalized,
    detect::ChangeDetector,
    error::{PipeError, Result},
    frame::{MediaProperties, VideoFrame},
    throttle::Throttled,
};

pub type ReadResult<T> = Result<(T, Release)>;

pub type BoxSource<T> = Box<dyn Source<Item = T>>;

/// Returns the buffers behind one read to their producer.
///
/// Releasing consumes the guard, so a second release cannot be written.
/// Dropping an unreleased guard releases it.
#[derive(Default)]
pub struct Release(Option<Box<dyn FnOnce() + Send>>);

impl Release {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// Guard with nothing to give back, used when ownership already moved by copy.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    pub fn release(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Release")
            .field(&if self.is_noop() { "noop" } else { "pending" })
            .finish()
    }
}

/// Blocking, pull-based producer.
pub trait Source: Send {
    type Item;

    /// Blocks until the next item is available. `PipeError::EndOfStream`
    /// marks exhaustion; any other error is passed to the caller untouched.
    fn read(&mut self) -> ReadResult<Self::Item>;
}

impl<S: Source + ?Sized> Source for Box<S> {
    type Item = S::Item;

    fn read(&mut self) -> ReadResult<Self::Item> {
        (**self).read()
    }
}

/// Decorator turning one source into another.
pub trait Transform<S: Source> {
    type Output: Source;

    fn apply(self, upstream: S) -> Self::Output;
}

pub struct FromFn<F>(F);

/// Source backed by a closure, mostly for devices and tests.
pub fn from_fn<T, F>(f: F) -> FromFn<F>
where
    F: FnMut() -> ReadResult<T> + Send,
{
    FromFn(f)
}

impl<T, F> Source for FromFn<F>
where
    F: FnMut() -> ReadResult<T> + Send,
{
    type Item = T;

    fn read(&mut self) -> ReadResult<T> {
        (self.0)()
    }
}

/// Latches the first end of stream.
pub struct Fuse<S> {
    inner: S,
    done: bool,
}

impl<S: Source> Source for Fuse<S> {
    type Item = S::Item;

    fn read(&mut self) -> ReadResult<S::Item> {
        if self.done {
            return Err(PipeError::EndOfStream);
        }
        match self.inner.read() {
            Err(PipeError::EndOfStream) => {
                self.done = true;
                Err(PipeError::EndOfStream)
            }
            other => other,
        }
    }
}

pub trait SourceExt: Source + Sized {
    fn pipe<T: Transform<Self>>(self, transform: T) -> T::Output {
        transform.apply(self)
    }

    fn fuse(self) -> Fuse<Self> {
        Fuse {
            inner: self,
            done: false,
        }
    }

    fn boxed(self) -> BoxSource<Self::Item>
    where
        Self: 'static,
    {
        Box::new(self)
    }

    fn throttle(self, frame_rate: f32) -> Throttled<Self, SystemClock> {
        Throttled::new(self, frame_rate, SystemClock)
    }

    fn detect_changes<F>(self, poll_interval: Duration, on_change: F) -> ChangeDetector<Self, F>
    where
        Self: Source<Item = VideoFrame>,
        F: FnMut(MediaProperties) + Send,
    {
        ChangeDetector::new(self, poll_interval, on_change, SystemClock)
    }

    fn to_i420(self) -> Normalized<Self>
    where
        Self: Source<Item = VideoFrame>,
    {
        Normalized::new(self)
    }
}

impl<S: Source> SourceExt for S {}
