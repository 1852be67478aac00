//! Frame orchestration.
//!
//! [`Renderer`] is a two-state machine (idle, frame started) that sequences
//! acquire, record, submit and present, and turns out-of-date or resized
//! surfaces into swapchain recreation.
//!
//! ```text
//! begin_frame ─ acquire ─┬─ out of date ─> recreate, None (skip this tick)
//!                        └─ acquired ───> begin recording, Some(cmd)
//! end_frame ── end recording ─ submit/present ─ advance slot
//!                        └─ out of date / suboptimal / resized ─> recreate
//! ```

use ash::vk;
use tracing::{debug, trace};

use starlight_rhi::swapchain::AcquireOutcome;
use starlight_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use crate::backend::FrameBackend;
use crate::error::RendererResult;

/// Drives one [`FrameBackend`] through the frame lifecycle.
pub struct Renderer<B: FrameBackend> {
    backend: B,
    current_image_index: u32,
    current_frame_index: usize,
    frame_in_progress: bool,
    recreate_pending: bool,
}

impl<B: FrameBackend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            current_image_index: 0,
            current_frame_index: 0,
            frame_in_progress: false,
            recreate_pending: false,
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.frame_in_progress
    }

    /// Frame slot used by the next (or current) frame.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.current_frame_index
    }

    /// Swapchain image acquired by the current frame.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.current_image_index
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.backend.aspect_ratio()
    }

    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.frame_in_progress,
            "Cannot get command buffer when frame not in progress"
        );
        self.backend.command_buffer(self.current_frame_index)
    }

    /// Starts a frame and returns its command buffer, already recording.
    ///
    /// Returns `None` when the swapchain had to be (or still has to be)
    /// rebuilt; the caller skips rendering this tick.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    pub fn begin_frame(&mut self) -> RendererResult<Option<vk::CommandBuffer>> {
        assert!(
            !self.frame_in_progress,
            "Can't call begin_frame while already in progress"
        );

        if self.recreate_pending && !self.recreate_swapchain()? {
            return Ok(None);
        }

        match self.backend.acquire_next_image()? {
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire");
                self.recreate_swapchain()?;
                return Ok(None);
            }
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    trace!("Acquired suboptimal image {}", image_index);
                }
                self.current_image_index = image_index;
            }
        }

        self.frame_in_progress = true;

        let cmd = self.backend.command_buffer(self.current_frame_index);
        self.backend.begin_commands(cmd)?;
        Ok(Some(cmd))
    }

    /// Ends recording, submits, presents and advances the frame slot.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn end_frame(&mut self) -> RendererResult<()> {
        assert!(
            self.frame_in_progress,
            "Can't call end_frame while frame is not in progress"
        );

        let cmd = self.backend.command_buffer(self.current_frame_index);
        self.backend.end_commands(cmd)?;

        let outcome = self.backend.submit(cmd, self.current_image_index)?;
        let resized = self.backend.take_resized();

        self.frame_in_progress = false;
        self.current_frame_index = (self.current_frame_index + 1) % MAX_FRAMES_IN_FLIGHT;

        if outcome.needs_recreate() || resized {
            debug!(
                "Recreating swapchain after present ({:?}, resized: {})",
                outcome, resized
            );
            self.recreate_swapchain()?;
        }

        Ok(())
    }

    /// # Panics
    ///
    /// Panics if no frame is in progress or `cmd` is not the current frame's
    /// command buffer.
    pub fn begin_swapchain_render_pass(&self, cmd: vk::CommandBuffer) {
        assert!(
            self.frame_in_progress,
            "Can't call begin_swapchain_render_pass if frame is not in progress"
        );
        assert_eq!(
            cmd,
            self.current_command_buffer(),
            "Can't begin render pass on command buffer from a different frame"
        );
        self.backend.begin_render_pass(cmd, self.current_image_index);
    }

    /// # Panics
    ///
    /// Panics if no frame is in progress or `cmd` is not the current frame's
    /// command buffer.
    pub fn end_swapchain_render_pass(&self, cmd: vk::CommandBuffer) {
        assert!(
            self.frame_in_progress,
            "Can't call end_swapchain_render_pass if frame is not in progress"
        );
        assert_eq!(
            cmd,
            self.current_command_buffer(),
            "Can't end render pass on command buffer from a different frame"
        );
        self.backend.end_render_pass(cmd);
    }

    /// Rebuilds the swapchain, or marks it pending while the drawable extent
    /// is zero. Returns whether a new swapchain exists.
    pub fn recreate_swapchain(&mut self) -> RendererResult<bool> {
        let recreated = self.backend.recreate_swapchain()?;
        self.recreate_pending = !recreated;
        Ok(recreated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Condvar, Mutex};
    use std::thread;
    use std::time::Duration;

    use ash::vk::Handle;
    use starlight_rhi::RhiResult;
    use starlight_rhi::swapchain::PresentOutcome;
    use starlight_rhi::sync::{HostFence, InFlightFrames};

    #[derive(Clone, Default)]
    struct CpuFence(Arc<(Mutex<bool>, Condvar)>);

    impl CpuFence {
        fn signaled() -> Self {
            let fence = Self::default();
            fence.signal();
            fence
        }

        fn signal(&self) {
            let (lock, cvar) = &*self.0;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
    }

    impl HostFence for CpuFence {
        fn wait(&self, _timeout: u64) -> RhiResult<()> {
            let (lock, cvar) = &*self.0;
            let guard = lock.lock().unwrap();
            let _guard = cvar.wait_while(guard, |signaled| !*signaled).unwrap();
            Ok(())
        }

        fn reset(&self) -> RhiResult<()> {
            *self.0.0.lock().unwrap() = false;
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Acquire,
        Begin(usize),
        End(usize),
        Submit { frame: usize, image: u32 },
        Recreate,
    }

    /// Scripted backend. Fences are only signaled when a test says so.
    struct MockBackend {
        calls: Vec<Call>,
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<PresentOutcome>,
        frames: InFlightFrames<CpuFence>,
        fences: Vec<CpuFence>,
        image_count: u32,
        next_image: u32,
        resized: AtomicBool,
        zero_extent: bool,
        auto_signal: bool,
        recreations: usize,
        formats_stable: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            let fences: Vec<CpuFence> = (0..MAX_FRAMES_IN_FLIGHT)
                .map(|_| CpuFence::signaled())
                .collect();
            Self {
                calls: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                frames: InFlightFrames::new(fences.clone(), 3),
                fences,
                image_count: 3,
                next_image: 0,
                resized: AtomicBool::new(false),
                zero_extent: false,
                auto_signal: true,
                recreations: 0,
                formats_stable: true,
            }
        }

        fn frame_of(cmd: vk::CommandBuffer) -> usize {
            cmd.as_raw() as usize - 1
        }

        fn submits(&self) -> Vec<(usize, u32)> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    Call::Submit { frame, image } => Some((*frame, *image)),
                    _ => None,
                })
                .collect()
        }
    }

    impl FrameBackend for MockBackend {
        fn acquire_next_image(&mut self) -> RendererResult<AcquireOutcome> {
            self.calls.push(Call::Acquire);
            self.frames.wait_current()?;
            if let Some(outcome) = self.acquire_script.pop_front() {
                return Ok(outcome);
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            })
        }

        fn command_buffer(&self, frame_index: usize) -> vk::CommandBuffer {
            vk::CommandBuffer::from_raw(frame_index as u64 + 1)
        }

        fn begin_commands(&self, cmd: vk::CommandBuffer) -> RendererResult<()> {
            // Recording must never start while the slot's fence is pending.
            self.frames.wait_current()?;
            let _ = cmd;
            Ok(())
        }

        fn end_commands(&self, _cmd: vk::CommandBuffer) -> RendererResult<()> {
            Ok(())
        }

        fn submit(
            &mut self,
            cmd: vk::CommandBuffer,
            image_index: u32,
        ) -> RendererResult<PresentOutcome> {
            let frame = Self::frame_of(cmd);
            assert_eq!(frame, self.frames.current_frame());
            self.calls.push(Call::Submit {
                frame,
                image: image_index,
            });
            self.frames.claim_image(image_index as usize)?;
            if self.auto_signal {
                self.frames.current_fence().signal();
            }
            self.frames.advance();
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(PresentOutcome::Optimal))
        }

        fn begin_render_pass(&self, cmd: vk::CommandBuffer, _image_index: u32) {
            let _ = Self::frame_of(cmd);
        }

        fn end_render_pass(&self, _cmd: vk::CommandBuffer) {}

        fn take_resized(&self) -> bool {
            self.resized.swap(false, Ordering::SeqCst)
        }

        fn recreate_swapchain(&mut self) -> RendererResult<bool> {
            if self.zero_extent {
                return Ok(false);
            }
            self.calls.push(Call::Recreate);
            self.recreations += 1;
            let slot = self.frames.current_frame();
            self.frames = InFlightFrames::new(self.fences.clone(), self.image_count as usize);
            self.frames.set_current_frame(slot);
            self.next_image = 0;
            assert!(self.formats_stable);
            Ok(true)
        }

        fn aspect_ratio(&self) -> f32 {
            800.0 / 600.0
        }
    }

    fn run_frame(renderer: &mut Renderer<MockBackend>) -> bool {
        let Some(cmd) = renderer.begin_frame().unwrap() else {
            return false;
        };
        renderer.begin_swapchain_render_pass(cmd);
        renderer.end_swapchain_render_pass(cmd);
        renderer.end_frame().unwrap();
        true
    }

    #[test]
    fn test_frame_slots_round_robin() {
        let mut renderer = Renderer::new(MockBackend::new());

        let mut slots = Vec::new();
        for _ in 0..5 {
            slots.push(renderer.frame_index());
            assert!(run_frame(&mut renderer));
            assert!(!renderer.is_frame_in_progress());
        }

        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(
            renderer.backend().submits(),
            vec![(0, 0), (1, 1), (0, 2), (1, 0), (0, 1)]
        );
    }

    #[test]
    fn test_out_of_date_on_first_frame_skips_submit() {
        let mut backend = MockBackend::new();
        backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
        let mut renderer = Renderer::new(backend);

        assert!(renderer.begin_frame().unwrap().is_none());
        assert!(!renderer.is_frame_in_progress());
        assert_eq!(
            renderer.backend().calls,
            vec![Call::Acquire, Call::Recreate]
        );
        assert!(renderer.backend().submits().is_empty());
        assert_eq!(renderer.frame_index(), 0);

        assert!(run_frame(&mut renderer));
        assert_eq!(renderer.backend().submits(), vec![(0, 0)]);
    }

    #[test]
    fn test_present_out_of_date_and_resize_trigger_recreate() {
        let mut backend = MockBackend::new();
        backend.present_script.push_back(PresentOutcome::OutOfDate);
        backend.present_script.push_back(PresentOutcome::Optimal);
        backend.present_script.push_back(PresentOutcome::Suboptimal);
        let mut renderer = Renderer::new(backend);

        run_frame(&mut renderer);
        assert_eq!(renderer.backend().recreations, 1);

        run_frame(&mut renderer);
        assert_eq!(renderer.backend().recreations, 1);

        run_frame(&mut renderer);
        assert_eq!(renderer.backend().recreations, 2);

        renderer.backend().resized.store(true, Ordering::SeqCst);
        run_frame(&mut renderer);
        assert_eq!(renderer.backend().recreations, 3);
        assert!(!renderer.backend().take_resized());
    }

    #[test]
    fn test_double_recreate_is_idempotent() {
        let mut renderer = Renderer::new(MockBackend::new());
        run_frame(&mut renderer);

        assert!(renderer.recreate_swapchain().unwrap());
        assert!(renderer.recreate_swapchain().unwrap());
        assert_eq!(renderer.backend().recreations, 2);

        assert!(run_frame(&mut renderer));
        assert_eq!(renderer.frame_index(), 0);
    }

    #[test]
    fn test_zero_extent_defers_recreation() {
        let mut backend = MockBackend::new();
        backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
        backend.zero_extent = true;
        let mut renderer = Renderer::new(backend);

        assert!(renderer.begin_frame().unwrap().is_none());
        assert!(renderer.begin_frame().unwrap().is_none());
        assert_eq!(renderer.backend().recreations, 0);
        // Only the first tick reached acquire.
        let acquires = renderer
            .backend()
            .calls
            .iter()
            .filter(|call| **call == Call::Acquire)
            .count();
        assert_eq!(acquires, 1);

        renderer.backend_mut().zero_extent = false;
        assert!(run_frame(&mut renderer));
        assert_eq!(renderer.backend().recreations, 1);
    }

    #[test]
    fn test_third_frame_blocks_until_first_slot_signals() {
        let mut backend = MockBackend::new();
        backend.auto_signal = false;
        let slot0 = backend.fences[0].clone();
        let mut renderer = Renderer::new(backend);

        assert!(run_frame(&mut renderer));
        assert!(run_frame(&mut renderer));
        assert_eq!(renderer.frame_index(), 0);

        let released = Arc::new(AtomicBool::new(false));
        let signaller = {
            let released = Arc::clone(&released);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                released.store(true, Ordering::SeqCst);
                slot0.signal();
            })
        };

        let cmd = renderer.begin_frame().unwrap();
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(cmd, Some(vk::CommandBuffer::from_raw(1)));
        signaller.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn test_begin_frame_twice_panics() {
        let mut renderer = Renderer::new(MockBackend::new());
        let _ = renderer.begin_frame().unwrap();
        let _ = renderer.begin_frame();
    }

    #[test]
    #[should_panic(expected = "not in progress")]
    fn test_end_frame_without_begin_panics() {
        let mut renderer = Renderer::new(MockBackend::new());
        let _ = renderer.end_frame();
    }

    #[test]
    #[should_panic(expected = "different frame")]
    fn test_render_pass_on_foreign_command_buffer_panics() {
        let mut renderer = Renderer::new(MockBackend::new());
        let _ = renderer.begin_frame().unwrap();
        renderer.begin_swapchain_render_pass(vk::CommandBuffer::from_raw(2));
    }

    #[test]
    #[should_panic(expected = "not in progress")]
    fn test_render_pass_outside_frame_panics() {
        let renderer = Renderer::new(MockBackend::new());
        renderer.end_swapchain_render_pass(vk::CommandBuffer::from_raw(1));
    }
}
