//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//! - [`FrameSync`] - the semaphore pair owned by one frame slot
//! - [`InFlightFrames`] - the frame-slot fence ring and per-image fence cache
//!
//! # Frame pacing
//!
//! ```text
//! acquire:  wait slot fence (current_frame)  -> acquire image i
//! submit:   wait fence recorded for image i (if any)
//!           record slot as owner of image i
//!           reset slot fence, submit (signals slot fence), present
//!           current_frame = (current_frame + 1) % MAX_FRAMES_IN_FLIGHT
//! ```
//!
//! With two slots the CPU can record frame N+1 while the GPU renders frame
//! N; a third frame blocks on the first slot's fence.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Host-side view of a fence: what frame pacing needs and nothing more.
///
/// Implemented by [`Fence`]; tests substitute a CPU fence to drive the
/// pacing logic without a GPU.
pub trait HostFence {
    /// Blocks until signaled or `timeout` nanoseconds pass.
    fn wait(&self, timeout: u64) -> RhiResult<()>;

    /// Returns the fence to the unsignaled state.
    fn reset(&self) -> RhiResult<()>;
}

/// Vulkan fence wrapper.
///
/// # Thread Safety
///
/// The fence is immutable after creation. Wait and reset operations can be
/// called from any thread, but proper synchronization is the caller's
/// responsibility when accessing fence state.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Start in the signaled state, so the first wait returns
    ///   immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Checks if the fence is currently signaled without blocking.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl HostFence for Fence {
    fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Semaphores owned by one frame slot.
pub struct FrameSync {
    /// Signaled by image acquisition, waited on by the submit.
    image_available: Semaphore,
    /// Signaled by the submit, waited on by present.
    render_finished: Semaphore,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device)?,
        })
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }
}

/// Frame-slot fence ring plus the per-image record of which slot last
/// rendered to each swapchain image.
#[derive(Debug)]
pub struct InFlightFrames<F> {
    fences: Vec<F>,
    images_in_flight: Vec<Option<usize>>,
    current_frame: usize,
}

impl<F: HostFence> InFlightFrames<F> {
    /// `fences` must hold one signaled fence per frame slot.
    pub fn new(fences: Vec<F>, image_count: usize) -> Self {
        assert!(!fences.is_empty(), "at least one frame slot is required");
        Self {
            fences,
            images_in_flight: vec![None; image_count],
            current_frame: 0,
        }
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Carries the slot position over from a previous ring.
    pub fn set_current_frame(&mut self, frame: usize) {
        self.current_frame = frame % self.fences.len();
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.fences.len()
    }

    #[inline]
    pub fn current_fence(&self) -> &F {
        &self.fences[self.current_frame]
    }

    /// Slot that last rendered to `image_index`, if any.
    pub fn image_owner(&self, image_index: usize) -> Option<usize> {
        self.images_in_flight.get(image_index).copied().flatten()
    }

    /// Blocks until the current slot's previous submission has completed.
    pub fn wait_current(&self) -> RhiResult<()> {
        self.current_fence().wait(u64::MAX)
    }

    /// Prepares the current slot to render into `image_index`.
    ///
    /// Waits for whichever slot last used the image, records the current
    /// slot as its owner and resets the current slot's fence, which the next
    /// submit must signal.
    pub fn claim_image(&mut self, image_index: usize) -> RhiResult<()> {
        if image_index >= self.images_in_flight.len() {
            self.images_in_flight.resize(image_index + 1, None);
        }
        if let Some(owner) = self.images_in_flight[image_index] {
            self.fences[owner].wait(u64::MAX)?;
        }
        self.images_in_flight[image_index] = Some(self.current_frame);
        self.current_fence().reset()
    }

    /// Moves to the next slot.
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.fences.len();
    }

    /// Forgets image ownership, e.g. after the image set was replaced.
    pub fn reset_images(&mut self, image_count: usize) {
        debug!("Resetting image fence cache for {} image(s)", image_count);
        self.images_in_flight = vec![None; image_count];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Condvar, Mutex};
    use std::thread;
    use std::time::Duration;

    /// CPU fence that can be signaled from another thread.
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

        fn is_signaled(&self) -> bool {
            *self.0.0.lock().unwrap()
        }
    }

    impl HostFence for CpuFence {
        fn wait(&self, timeout: u64) -> RhiResult<()> {
            let (lock, cvar) = &*self.0;
            let guard = lock.lock().unwrap();
            if timeout == u64::MAX {
                let _guard = cvar.wait_while(guard, |signaled| !*signaled).unwrap();
                return Ok(());
            }
            let (_guard, result) = cvar
                .wait_timeout_while(guard, Duration::from_nanos(timeout), |signaled| !*signaled)
                .unwrap();
            if result.timed_out() {
                return Err(RhiError::VulkanError(vk::Result::TIMEOUT));
            }
            Ok(())
        }

        fn reset(&self) -> RhiResult<()> {
            *self.0.0.lock().unwrap() = false;
            Ok(())
        }
    }

    fn ring(image_count: usize) -> InFlightFrames<CpuFence> {
        let fences = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| CpuFence::signaled())
            .collect();
        InFlightFrames::new(fences, image_count)
    }

    #[test]
    fn test_slots_round_robin() {
        let mut frames = ring(3);
        let mut seen = Vec::new();
        for image in 0..5 {
            seen.push(frames.current_frame());
            frames.wait_current().unwrap();
            frames.claim_image(image % 3).unwrap();
            // Stand-in for the GPU completing the submission.
            frames.current_fence().signal();
            frames.advance();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_claim_records_owner_and_resets_fence() {
        let mut frames = ring(3);
        frames.advance();
        frames.claim_image(2).unwrap();
        assert_eq!(frames.image_owner(2), Some(1));
        assert_eq!(frames.image_owner(0), None);
        assert!(!frames.current_fence().is_signaled());
    }

    #[test]
    fn test_third_frame_waits_for_first_slot() {
        let mut frames = ring(3);

        // Frames 0 and 1 are submitted; their fences stay unsignaled.
        for image in 0..2 {
            frames.wait_current().unwrap();
            frames.claim_image(image).unwrap();
            frames.advance();
        }
        assert_eq!(frames.current_frame(), 0);

        let slot0 = frames.current_fence().clone();
        let released = Arc::new(AtomicBool::new(false));
        let signaller = {
            let released = Arc::clone(&released);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                released.store(true, Ordering::SeqCst);
                slot0.signal();
            })
        };

        frames.wait_current().unwrap();
        assert!(released.load(Ordering::SeqCst));
        signaller.join().unwrap();
    }

    #[test]
    fn test_reused_image_waits_for_owner() {
        let mut frames = ring(1);
        frames.claim_image(0).unwrap();
        frames.advance();

        // Slot 1 wants image 0, still owned by unsignaled slot 0.
        let owner = frames.fences[0].clone();
        let signaller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            owner.signal();
        });
        frames.claim_image(0).unwrap();
        signaller.join().unwrap();
        assert_eq!(frames.image_owner(0), Some(1));
    }

    #[test]
    fn test_timeout_reported() {
        let fence = CpuFence::default();
        assert!(HostFence::wait(&fence, 1_000).is_err());
    }

    #[test]
    fn test_carry_over_and_reset_images() {
        let mut frames = ring(2);
        frames.claim_image(1).unwrap();
        frames.set_current_frame(3);
        assert_eq!(frames.current_frame(), 1);
        frames.reset_images(4);
        assert_eq!(frames.image_owner(1), None);
        assert_eq!(frames.image_owner(3), None);
    }

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
