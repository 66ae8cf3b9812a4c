//! Device memory for the two kinds of resource the renderer allocates:
//! host-written vertex buffers and device-local depth images.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocatorDebugSettings, MemoryLocation};

use crate::error::{GpuError, Result};

/// Owns the gpu-allocator heap for one device.
///
/// Freed memory goes back to the heap; whatever is still allocated when the
/// allocator shuts down is reported as a leak.
pub struct GpuAllocator {
    heap: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// # Safety
    /// The instance, device and physical device must be valid and must
    /// outlive the allocator.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let heap = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                ..AllocatorDebugSettings::default()
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            heap: Some(heap),
            device,
        })
    }

    /// Create a vertex buffer sized for `vertices` and copy them in.
    ///
    /// The memory stays mapped and host-visible. Nothing is left allocated
    /// when any step fails.
    pub fn upload_vertices<T: bytemuck::Pod>(
        &mut self,
        vertices: &[T],
        name: &str,
    ) -> Result<GpuBuffer> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        if bytes.is_empty() {
            return Err(GpuError::InvalidState(format!("{name}: no vertex data")));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(bytes.len() as u64)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: The device is valid for the allocator's lifetime
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        // SAFETY: The buffer was just created on this device
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let mut vertex_buffer = GpuBuffer {
            buffer,
            allocation: None,
            len: bytes.len() as u64,
        };

        let filled = self
            .allocate(requirements, MemoryLocation::CpuToGpu, true, name)
            .and_then(|allocation| {
                // SAFETY: The allocation was made for this buffer's requirements
                let result = unsafe {
                    self.device
                        .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                };
                vertex_buffer.allocation = Some(allocation);
                result.map_err(GpuError::from)
            })
            .and_then(|()| vertex_buffer.fill(bytes));

        if let Err(e) = filled {
            self.free_buffer(&mut vertex_buffer)?;
            return Err(e);
        }

        Ok(vertex_buffer)
    }

    /// Create a device-local depth attachment covering `extent`.
    pub fn depth_image(
        &mut self,
        extent: vk::Extent2D,
        format: vk::Format,
        name: &str,
    ) -> Result<GpuImage> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: The device is valid for the allocator's lifetime
        let image = unsafe { self.device.create_image(&create_info, None)? };
        // SAFETY: The image was just created on this device
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let mut depth = GpuImage {
            image,
            allocation: None,
            extent,
        };

        let bound = self
            .allocate(requirements, MemoryLocation::GpuOnly, false, name)
            .and_then(|allocation| {
                // SAFETY: The allocation was made for this image's requirements
                let result = unsafe {
                    self.device
                        .bind_image_memory(image, allocation.memory(), allocation.offset())
                };
                depth.allocation = Some(allocation);
                result.map_err(GpuError::from)
            });

        if let Err(e) = bound {
            self.free_image(&mut depth)?;
            return Err(e);
        }

        Ok(depth)
    }

    /// Destroy a vertex buffer and return its memory. Safe to call twice.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        if buffer.buffer != vk::Buffer::null() {
            // SAFETY: Callers only free buffers the GPU is done with
            unsafe { self.device.destroy_buffer(buffer.buffer, None) };
            buffer.buffer = vk::Buffer::null();
        }
        match buffer.allocation.take() {
            Some(allocation) => self.release(allocation),
            None => Ok(()),
        }
    }

    /// Destroy an image and return its memory. Safe to call twice.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        if image.image != vk::Image::null() {
            // SAFETY: Callers only free images the GPU is done with
            unsafe { self.device.destroy_image(image.image, None) };
            image.image = vk::Image::null();
        }
        match image.allocation.take() {
            Some(allocation) => self.release(allocation),
            None => Ok(()),
        }
    }

    /// Drop the heap. Must run before the device is destroyed.
    pub fn shutdown(&mut self) {
        drop(self.heap.take());
    }

    fn heap(&mut self) -> Result<&mut Allocator> {
        self.heap
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))
    }

    fn allocate(
        &mut self,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
        name: &str,
    ) -> Result<Allocation> {
        self.heap()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(format!("{name}: {e}")))
    }

    fn release(&mut self, allocation: Allocation) -> Result<()> {
        self.heap()?
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A vertex buffer and the mapped memory behind it.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    len: u64,
}

impl GpuBuffer {
    /// Size in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn fill(&mut self, bytes: &[u8]) -> Result<()> {
        check_fits(bytes.len(), self.len)?;
        let mapped = self
            .allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or_else(|| GpuError::InvalidState("Vertex buffer is not mapped".to_string()))?;
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// A depth image and its device-local memory.
pub struct GpuImage {
    pub image: vk::Image,
    allocation: Option<Allocation>,
    pub extent: vk::Extent2D,
}

fn check_fits(bytes: usize, capacity: u64) -> Result<()> {
    if bytes as u64 > capacity {
        return Err(GpuError::InvalidState(format!(
            "{bytes} bytes do not fit in a {capacity}-byte buffer"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_up_to_capacity_fits() {
        assert!(check_fits(0, 36).is_ok());
        assert!(check_fits(36, 36).is_ok());
    }

    #[test]
    fn oversized_data_is_rejected() {
        let err = check_fits(37, 36).unwrap_err();
        assert!(err.to_string().contains("37 bytes"));
    }
}
