use rustc_hash::FxHashMap;

use crate::errors::ErrorReporter;
use crate::renderer::device::context::{GraphicsContext, OffscreenBacking, SurfaceFeatures};
use crate::scene::OffscreenKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffscreenRequest {
    Add {
        key: OffscreenKey,
        width: u32,
        height: u32,
    },
    Update {
        key: OffscreenKey,
        width: u32,
        height: u32,
    },
    Remove(OffscreenKey),
}

/// A live backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffscreenBuffer {
    pub width: u32,
    pub height: u32,
    pub backing: OffscreenBacking,
}

/// Backing buffers for offscreen render targets.
///
/// Changes are queued as they are observed and applied once per frame by
/// [`OffscreenBuffers::reconcile`], before any instruction runs.
#[derive(Debug, Default)]
pub struct OffscreenBuffers {
    queue: Vec<OffscreenRequest>,
    live: FxHashMap<OffscreenKey, OffscreenBuffer>,
}

impl OffscreenBuffers {
    /// Queues an add or update so that `key` ends up `width` x `height`.
    pub fn require(&mut self, key: OffscreenKey, width: u32, height: u32) {
        let pending = self.queue.iter().rev().find_map(|r| match *r {
            OffscreenRequest::Add { key: k, width, height }
            | OffscreenRequest::Update { key: k, width, height }
                if k == key =>
            {
                Some((width, height))
            }
            _ => None,
        });
        let current = pending.or_else(|| self.live.get(&key).map(|b| (b.width, b.height)));
        match current {
            Some(size) if size == (width, height) => {}
            Some(_) => self.queue.push(OffscreenRequest::Update { key, width, height }),
            None => self.queue.push(OffscreenRequest::Add { key, width, height }),
        }
    }

    pub fn remove(&mut self, key: OffscreenKey) {
        self.queue.retain(|r| {
            !matches!(*r,
                OffscreenRequest::Add { key: k, .. } | OffscreenRequest::Update { key: k, .. }
                    if k == key)
        });
        self.queue.push(OffscreenRequest::Remove(key));
    }

    #[must_use]
    pub fn get(&self, key: OffscreenKey) -> Option<&OffscreenBuffer> {
        self.live.get(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Applies the queue against `context`.
    pub fn reconcile(
        &mut self,
        context: &mut dyn GraphicsContext,
        features: SurfaceFeatures,
        reporter: &dyn ErrorReporter,
    ) {
        for request in self.queue.drain(..) {
            match request {
                OffscreenRequest::Add { key, width, height } => {
                    let backing = if features.contains(SurfaceFeatures::FRAMEBUFFER_OBJECTS) {
                        OffscreenBacking::FramebufferObject
                    } else if features.contains(SurfaceFeatures::PBUFFERS) {
                        OffscreenBacking::PixelBuffer
                    } else {
                        reporter.warning(&format!(
                            "No offscreen support for {key:?}, surface will not be rendered"
                        ));
                        continue;
                    };
                    match context.create_offscreen(key, width, height, backing) {
                        Ok(()) => {
                            log::debug!("Allocated {backing:?} {width}x{height} for {key:?}");
                            self.live.insert(
                                key,
                                OffscreenBuffer {
                                    width,
                                    height,
                                    backing,
                                },
                            );
                        }
                        Err(err) => reporter.error(
                            &format!("Failed to allocate offscreen buffer for {key:?}"),
                            Some(&err),
                        ),
                    }
                }
                OffscreenRequest::Update { key, width, height } => {
                    let Some(buffer) = self.live.get_mut(&key) else {
                        continue;
                    };
                    match context.resize_offscreen(key, width, height) {
                        Ok(()) => {
                            buffer.width = width;
                            buffer.height = height;
                        }
                        Err(err) => reporter.error(
                            &format!("Failed to resize offscreen buffer for {key:?}"),
                            Some(&err),
                        ),
                    }
                }
                OffscreenRequest::Remove(key) => {
                    if self.live.remove(&key).is_some() {
                        context.delete_offscreen(key);
                    }
                }
            }
        }
    }

    /// Deletes every live buffer and drops the queue.
    pub fn delete_all(&mut self, context: &mut dyn GraphicsContext) {
        self.queue.clear();
        for (key, _) in self.live.drain() {
            context.delete_offscreen(key);
        }
    }

    /// Requeues every live buffer for allocation, after the context that
    /// owned them was recreated.
    pub fn requeue_all(&mut self) {
        let live: Vec<_> = self.live.drain().collect();
        for (key, buffer) in live {
            self.queue.insert(
                0,
                OffscreenRequest::Add {
                    key,
                    width: buffer.width,
                    height: buffer.height,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;
    use crate::errors::LogReporter;
    use crate::renderer::device::headless::{HeadlessContext, HeadlessEvent};
    use crate::renderer::device::context::SurfaceInfo;

    fn key() -> OffscreenKey {
        let mut keys: SlotMap<OffscreenKey, ()> = SlotMap::with_key();
        keys.insert(())
    }

    #[test]
    fn prefers_framebuffer_objects() {
        let mut ctx = HeadlessContext::new(SurfaceInfo::default());
        let mut buffers = OffscreenBuffers::default();
        let k = key();
        buffers.require(k, 64, 32);
        buffers.reconcile(
            &mut ctx,
            SurfaceFeatures::FRAMEBUFFER_OBJECTS | SurfaceFeatures::PBUFFERS,
            &LogReporter,
        );
        assert_eq!(buffers.get(k).map(|b| b.backing), Some(OffscreenBacking::FramebufferObject));
    }

    #[test]
    fn falls_back_to_pbuffers_then_fails() {
        let mut ctx = HeadlessContext::new(SurfaceInfo::default());
        let k = key();

        let mut buffers = OffscreenBuffers::default();
        buffers.require(k, 8, 8);
        buffers.reconcile(&mut ctx, SurfaceFeatures::PBUFFERS, &LogReporter);
        assert_eq!(buffers.get(k).map(|b| b.backing), Some(OffscreenBacking::PixelBuffer));

        let mut buffers = OffscreenBuffers::default();
        buffers.require(k, 8, 8);
        buffers.reconcile(&mut ctx, SurfaceFeatures::empty(), &LogReporter);
        assert!(buffers.get(k).is_none());
    }

    #[test]
    fn unchanged_size_queues_nothing() {
        let mut ctx = HeadlessContext::new(SurfaceInfo::default());
        let mut buffers = OffscreenBuffers::default();
        let k = key();
        buffers.require(k, 16, 16);
        buffers.reconcile(&mut ctx, SurfaceFeatures::FRAMEBUFFER_OBJECTS, &LogReporter);
        ctx.take_events();

        buffers.require(k, 16, 16);
        buffers.reconcile(&mut ctx, SurfaceFeatures::FRAMEBUFFER_OBJECTS, &LogReporter);
        assert!(ctx.events().is_empty());

        buffers.require(k, 32, 16);
        buffers.reconcile(&mut ctx, SurfaceFeatures::FRAMEBUFFER_OBJECTS, &LogReporter);
        assert_eq!(
            ctx.events(),
            vec![HeadlessEvent::ResizeOffscreen {
                key: k,
                width: 32,
                height: 16
            }]
        );
    }
}
