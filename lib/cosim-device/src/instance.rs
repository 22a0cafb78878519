//! Host instance facade (spec component C10): ties the cosim device behind
//! a single "load bitstream -> set args -> run -> read back" API. Grounded
//! in the original's `Instance::Invoke`, which is literally `SetArgs +
//! WriteToDevice + Exec + ReadFromDevice + (Finish if no stream args)`.
//!
//! This crate implements only the cosimulation backend end-to-end (the
//! Xilinx/Intel OpenCL device implementations the original probes for are
//! external collaborators, out of scope here), so `Instance` wraps
//! `CosimDevice` directly rather than dispatching on the bitstream's magic
//! header.

use anyhow::Result;

use crate::buffer::Buffer;
use crate::config::CosimFlags;
use crate::device::CosimDevice;

/// The host-side handle an application holds for the lifetime of one kernel
/// invocation.
pub struct Instance {
    device: CosimDevice,
    has_stream_args: bool,
}

impl Instance {
    /// Opens `bitstream_path` as a cosimulation bitstream.
    pub fn new(bitstream_path: impl Into<std::path::PathBuf>, flags: CosimFlags) -> Result<Self> {
        Ok(Self {
            device: CosimDevice::new(bitstream_path, flags)?,
            has_stream_args: false,
        })
    }

    pub fn set_scalar_arg<T: Copy>(&mut self, index: usize, value: T) -> Result<()> {
        self.device.set_scalar_arg(index, value)
    }

    pub fn set_buffer_arg<T>(&mut self, index: usize, buffer: &Buffer<T>) -> Result<()> {
        self.device.set_buffer_arg(index, buffer)
    }

    pub fn set_stream_arg(&mut self, index: usize, path: impl Into<std::path::PathBuf>) -> Result<()> {
        self.has_stream_args = true;
        self.device.set_stream_arg(index, path)
    }

    /// `set_args(args) + write_to_device() + exec() + read_from_device() +
    /// (finish() if no stream args)`. Stream-bearing invocations leave
    /// `finish()` to the caller, since a stream-carrying kernel may run
    /// concurrently with the host feeding/draining its queues.
    pub fn invoke(&mut self) -> Result<()> {
        self.device.write_to_device();
        self.device.exec()?;
        self.device.read_from_device();
        if !self.has_stream_args {
            self.device.finish()?;
        }
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        self.device.finish()
    }

    pub fn device(&self) -> &CosimDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut CosimDevice {
        &mut self.device
    }
}

// `Instance` itself only sequences calls into `CosimDevice`, which already
// has constructor/transfer coverage in `device.rs`; exercising `Instance`
// end-to-end needs a real bitstream archive and a `tapa-fast-cosim`
// executable stand-in, which belongs in an integration-style test fixture
// rather than here.
