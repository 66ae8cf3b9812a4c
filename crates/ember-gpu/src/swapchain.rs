//! Swapchain management.

use std::time::Duration;

use ash::vk;

use crate::error::{GpuError, Result};
use crate::memory::{GpuAllocator, GpuImage};
use crate::sync::{create_semaphore, timeout_nanos};

/// Format used for the depth attachment.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// A presentable image, the view the render pass draws through, and the
/// semaphore its present waits on.
///
/// Render-finished is keyed by image rather than by frame slot. A slot's fence
/// only covers its submission, while the present that waits on the semaphore
/// may still be queued. The image itself is not acquired again until that
/// present has consumed the semaphore.
#[derive(Debug)]
pub struct SwapchainImage {
    pub index: u32,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub render_finished: vk::Semaphore,
}

impl SwapchainImage {
    unsafe fn new(
        device: &ash::Device,
        index: u32,
        image: vk::Image,
        format: vk::Format,
    ) -> Result<Self> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        // SAFETY: The image belongs to a live swapchain on this device
        let view = unsafe { device.create_image_view(&view_info, None)? };
        // SAFETY: The device is valid
        let render_finished = match unsafe { create_semaphore(device) } {
            Ok(semaphore) => semaphore,
            Err(e) => {
                // SAFETY: The view was never used
                unsafe { device.destroy_image_view(view, None) };
                return Err(e);
            }
        };

        Ok(Self {
            index,
            image,
            view,
            render_finished,
        })
    }

    unsafe fn destroy(self, device: &ash::Device) {
        // SAFETY: The caller guarantees no present still waits on the image
        unsafe {
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_image_view(self.view, None);
        }
    }
}

/// Depth attachment shared by every framebuffer of a swapchain.
pub struct DepthBuffer {
    pub image: GpuImage,
    pub view: vk::ImageView,
}

impl DepthBuffer {
    /// Allocate a device-local depth image matching `extent`.
    ///
    /// # Safety
    /// The device must be the one `allocator` was created for.
    pub unsafe fn new(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut image = allocator.depth_image(extent, DEPTH_FORMAT, "depth")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .level_count(1)
                    .layer_count(1),
            );

        // SAFETY: The image is bound to memory
        match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => Ok(Self { image, view }),
            Err(e) => {
                allocator.free_image(&mut image)?;
                Err(e.into())
            }
        }
    }

    /// Destroy the view and free the image.
    ///
    /// # Safety
    /// The depth buffer must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        unsafe { device.destroy_image_view(self.view, None) };
        self.view = vk::ImageView::null();
        allocator.free_image(&mut self.image)
    }
}

/// Result of asking the presentation engine for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. `suboptimal` still allows drawing to it.
    Acquired { index: u32, suboptimal: bool },
    /// No image was acquired and the swapchain must be rebuilt.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// Not presented; the swapchain must be rebuilt.
    OutOfDate,
}

/// Swapchain wrapper.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<SwapchainImage>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub depth: DepthBuffer,
}

impl Swapchain {
    /// Create a new swapchain with its image views and depth buffer.
    ///
    /// # Safety
    /// All handles must be valid.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(choose_image_count(surface_capabilities))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        // SAFETY: The swapchain was just created on this device
        let built = unsafe {
            build_images(
                device,
                allocator,
                swapchain_loader,
                swapchain,
                surface_format.format,
                extent,
            )
        };
        let (images, depth) = match built {
            Ok(parts) => parts,
            Err(e) => {
                // SAFETY: Nothing was presented from the new swapchain
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        tracing::info!(
            "Swapchain created: {} images, {}x{}, {:?}, {:?}",
            images.len(),
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        Ok(Self {
            swapchain,
            images,
            format: surface_format.format,
            extent,
            present_mode,
            depth,
        })
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next image, signaling `semaphore` once it is ready.
    ///
    /// A wait longer than `timeout` is an error, never a silent skip.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout: Duration,
    ) -> Result<AcquireOutcome> {
        let result = unsafe {
            swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_nanos(timeout),
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(GpuError::Timeout {
                operation: "swapchain acquire",
                timeout,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// The semaphore a submission drawing to `image_index` must signal.
    pub fn render_finished(&self, image_index: u32) -> Result<vk::Semaphore> {
        render_finished_for(&self.images, image_index)
    }

    /// Queue an image for presentation once its render-finished semaphore
    /// signals.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
    ) -> Result<PresentOutcome> {
        let wait_semaphores = [self.render_finished(image_index)?];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Destroy the swapchain, its views and its depth buffer.
    ///
    /// # Safety
    /// All handles must be valid and the swapchain must not be in use.
    pub unsafe fn destroy(
        &mut self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        allocator: &mut GpuAllocator,
    ) -> Result<()> {
        unsafe {
            self.depth.destroy(device, allocator)?;
            for image in self.images.drain(..) {
                image.destroy(device);
            }
            swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        self.swapchain = vk::SwapchainKHR::null();
        Ok(())
    }
}

/// Views, semaphores and the depth buffer for a new swapchain. On failure
/// whatever was already built is destroyed again.
unsafe fn build_images(
    device: &ash::Device,
    allocator: &mut GpuAllocator,
    swapchain_loader: &ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
) -> Result<(Vec<SwapchainImage>, DepthBuffer)> {
    // SAFETY: The swapchain was just created
    let raw_images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

    let mut images = Vec::with_capacity(raw_images.len());
    let mut built = Ok(());
    for (index, image) in (0u32..).zip(raw_images) {
        // SAFETY: The image belongs to the swapchain
        match unsafe { SwapchainImage::new(device, index, image, format) } {
            Ok(image) => images.push(image),
            Err(e) => {
                built = Err(e);
                break;
            }
        }
    }

    // SAFETY: The allocator belongs to this device
    let depth = built.and_then(|()| unsafe { DepthBuffer::new(device, allocator, extent) });
    match depth {
        Ok(depth) => Ok((images, depth)),
        Err(e) => {
            for image in images {
                // SAFETY: None of the images was ever acquired
                unsafe { image.destroy(device) };
            }
            Err(e)
        }
    }
}

fn render_finished_for(images: &[SwapchainImage], image_index: u32) -> Result<vk::Semaphore> {
    images
        .iter()
        .find(|image| image.index == image_index)
        .map(|image| image.render_finished)
        .ok_or_else(|| {
            GpuError::ResourceNotFound(format!(
                "swapchain image {image_index} of {}",
                images.len()
            ))
        })
}

/// One image more than the minimum, capped by the maximum when there is one.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Select the best surface format, preferring sRGB BGRA8.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        // FIFO is always supported
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn images(count: u32) -> Vec<SwapchainImage> {
        (0..count)
            .map(|index| SwapchainImage {
                index,
                image: vk::Image::null(),
                view: vk::ImageView::null(),
                render_finished: vk::Semaphore::from_raw(u64::from(index) + 100),
            })
            .collect()
    }

    #[test]
    fn each_image_has_its_own_render_finished() {
        let images = images(3);
        let semaphores: Vec<vk::Semaphore> = (0..3)
            .map(|index| render_finished_for(&images, index).unwrap())
            .collect();

        assert_eq!(semaphores[2].as_raw(), 102);
        assert_ne!(semaphores[0], semaphores[1]);
        assert_ne!(semaphores[1], semaphores[2]);
    }

    #[test]
    fn unknown_image_has_no_render_finished() {
        let err = render_finished_for(&images(2), 2).unwrap_err();
        assert!(matches!(err, GpuError::ResourceNotFound(_)));
    }

    #[test]
    fn prefers_srgb_format() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            select_surface_format(&available).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [format(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(
            select_surface_format(&available).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn vsync_always_uses_fifo() {
        let available = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(
            select_present_mode(&available, true),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn uncapped_prefers_mailbox_then_immediate() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);

        let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            select_present_mode(&no_mailbox, false),
            vk::PresentModeKHR::IMMEDIATE
        );

        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_current_when_fixed() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = calculate_extent(&caps, 1280, 720);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamps_when_surface_defers() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        };
        let extent = calculate_extent(&caps, 1280, 720);
        assert_eq!((extent.width, extent.height), (1024, 720));
    }

    #[test]
    fn image_count_respects_maximum() {
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&unbounded), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capped), 2);
    }
}
