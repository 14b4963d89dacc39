//! GPU Context Management
//!
//! This module handles GPU device initialization and the small set of buffer
//! operations the engine needs: creation, synchronous readback and
//! submit-and-wait. Compute pipelines are built per engine instance (their
//! shader source depends on the game), so the context stays game-agnostic.

use std::sync::Arc;

use wgpu::{
    Buffer, BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Device, DeviceDescriptor,
    Features, Instance, InstanceDescriptor, Maintain, PowerPreference, Queue,
    RequestAdapterOptions,
};

use crate::error::{EngineError, Result};

/// GPU context holding the device, queue and adapter information.
///
/// This is the entry point for all device operations. One context can back
/// any number of engine instances.
pub struct GpuContext {
    device: Arc<Device>,
    queue: Arc<Queue>,
    adapter_info: wgpu::AdapterInfo,
    max_storage_binding: u64,
}

impl GpuContext {
    /// Initializes the GPU device.
    ///
    /// Requests a high-performance adapter with the adapter's own limits, so
    /// storage bindings can grow to what the hardware actually supports
    /// rather than the conservative defaults.
    pub fn new() -> Result<Self> {
        let instance = Instance::new(InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| EngineError::NoAdapter("no GPU adapter available".to_string()))?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();

        let (device, queue) = pollster::block_on(adapter.request_device(
            &DeviceDescriptor {
                label: Some("MCTS GPU Device"),
                required_features: Features::empty(),
                required_limits: limits.clone(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| EngineError::DeviceRequest(e.to_string()))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            max_storage_binding: u64::from(limits.max_storage_buffer_binding_size),
        })
    }

    /// Returns the GPU device handle
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the command queue
    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Returns the GPU adapter information
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Largest single storage binding the device accepts, in bytes
    pub fn max_storage_binding(&self) -> u64 {
        self.max_storage_binding
    }

    /// Creates a storage buffer usable as copy source and destination
    pub fn create_storage_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Creates a uniform buffer
    pub fn create_uniform_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Submits a command buffer and blocks until the device has finished it
    pub fn submit_and_wait(&self, command_buffer: wgpu::CommandBuffer) {
        self.queue.submit(std::iter::once(command_buffer));
        self.device.poll(Maintain::Wait);
    }

    /// Reads `size` bytes from the start of `buffer` back to the host.
    ///
    /// Copies through a transient staging buffer and blocks on the map, which
    /// is acceptable here: readback happens once per run, never per step.
    pub fn read_buffer(&self, buffer: &Buffer, size: u64) -> Vec<u8> {
        let staging = self.device.create_buffer(&BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        self.device.poll(Maintain::Wait);

        let data = slice.get_mapped_range();
        let bytes = data.to_vec();
        drop(data);
        staging.unmap();
        bytes
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter_name", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("max_storage_binding", &self.max_storage_binding)
            .finish()
    }
}
