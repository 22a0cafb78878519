//! Host-side cosimulation device driver (spec component C8), grounded in
//! `tapa_fast_cosim_device.h`/`.cpp`: owns the per-argument tables (scalars,
//! buffers, streams), spawns the `tapa-fast-cosim` subprocess non-blockingly
//! on `exec`, and reports the load/compute/store timings the way the
//! original does.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use graph_abi::{ArgCat, ArgInfo, BufferTag};
use serde_json::json;
use tempfile::TempDir;

use crate::args_info::parse_args_info;
use crate::buffer::Buffer;
use crate::config::CosimFlags;

/// A type-erased view of one buffer argument: pointer, element size and
/// count, extracted from the caller's `Buffer<T>` at `set_buffer_arg` time.
/// Mirrors the original's `BufferArg`, which type-erases the same way.
struct ErasedBuffer {
    ptr: *mut u8,
    elem_size: usize,
    count: usize,
    tag: BufferTag,
}

impl ErasedBuffer {
    fn of<T>(buffer: &Buffer<T>) -> Self {
        Self {
            ptr: buffer.as_ptr() as *mut u8,
            elem_size: std::mem::size_of::<T>(),
            count: buffer.len(),
            tag: buffer.tag(),
        }
    }

    fn size_in_bytes(&self) -> usize {
        self.elem_size * self.count
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.size_in_bytes()) }
    }

    fn as_mut_bytes(&self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size_in_bytes()) }
    }
}

enum WorkDir {
    UserSupplied(PathBuf),
    Temp(TempDir),
}

impl WorkDir {
    fn path(&self) -> &Path {
        match self {
            WorkDir::UserSupplied(p) => p,
            WorkDir::Temp(t) => t.path(),
        }
    }
}

fn input_data_path(work_dir: &Path, index: usize) -> PathBuf {
    work_dir.join(format!("{index}.bin"))
}

fn output_data_path(work_dir: &Path, index: usize) -> PathBuf {
    work_dir.join(format!("{index}_out.bin"))
}

fn config_path(work_dir: &Path) -> PathBuf {
    work_dir.join("config.json")
}

struct ExecContext {
    start: Instant,
    child: Child,
}

/// The host-side handle to one cosimulation run: one `CosimDevice` per
/// kernel invocation, matching the original's one-`TapaFastCosimDevice`-
/// per-bitstream lifetime.
pub struct CosimDevice {
    xo_path: PathBuf,
    work_dir: WorkDir,
    flags: CosimFlags,
    args: Vec<ArgInfo>,

    scalars: HashMap<usize, String>,
    buffers: HashMap<usize, ErasedBuffer>,
    streams: HashMap<usize, PathBuf>,
    load_indices: HashSet<usize>,
    store_indices: HashSet<usize>,

    write_to_device_scheduled: bool,
    read_from_device_scheduled: bool,

    load_time: Duration,
    compute_time: Duration,
    store_time: Duration,

    context: Option<ExecContext>,
}

impl CosimDevice {
    /// Opens the bitstream archive at `xo_path`, parses its `kernel.xml`
    /// argument metadata, and resolves a work directory: the caller-supplied
    /// one in `flags.xosim_work_dir` (created if missing, kept on drop) or a
    /// fresh `tempfile::TempDir` (removed on drop), matching
    /// `GetWorkDirectory`'s branch exactly.
    pub fn new(xo_path: impl Into<PathBuf>, flags: CosimFlags) -> Result<Self> {
        let xo_path = xo_path.into();
        let args = parse_args_info(&xo_path)?;

        let work_dir = match &flags.xosim_work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating work directory '{dir}'"))?;
                WorkDir::UserSupplied(PathBuf::from(dir))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("tapa-fast-cosim.")
                    .tempdir()
                    .context("creating temporary work directory")?;
                WorkDir::Temp(dir)
            }
        };

        Ok(Self {
            xo_path,
            work_dir,
            flags,
            args,
            scalars: HashMap::new(),
            buffers: HashMap::new(),
            streams: HashMap::new(),
            load_indices: HashSet::new(),
            store_indices: HashSet::new(),
            write_to_device_scheduled: false,
            read_from_device_scheduled: false,
            load_time: Duration::ZERO,
            compute_time: Duration::ZERO,
            store_time: Duration::ZERO,
            context: None,
        })
    }

    fn arg(&self, index: usize) -> Result<&ArgInfo> {
        self.args
            .get(index)
            .with_context(|| format!("cannot set argument #{index}; there are only {} arguments", self.args.len()))
    }

    /// Sets a scalar argument's value, rendered as a little-endian Verilog
    /// hex literal (`'h...`) the way `SetScalarArg` does.
    pub fn set_scalar_arg<T: Copy>(&mut self, index: usize, value: T) -> Result<()> {
        let arg = self.arg(index)?;
        anyhow::ensure!(
            arg.cat == ArgCat::Scalar,
            "cannot set argument '{}' as a scalar; it is a {}",
            arg.name,
            arg.cat
        );
        let bytes = unsafe {
            std::slice::from_raw_parts(&value as *const T as *const u8, std::mem::size_of::<T>())
        };
        let mut hex = String::from("'h");
        for byte in bytes.iter().rev() {
            use std::fmt::Write as _;
            let _ = write!(hex, "{byte:02x}");
        }
        self.scalars.insert(index, hex);
        Ok(())
    }

    /// Registers a buffer argument, adding it to the load and/or store sets
    /// according to its tag (see [`graph_abi::BufferTag::is_load`] /
    /// [`graph_abi::BufferTag::is_store`]).
    pub fn set_buffer_arg<T>(&mut self, index: usize, buffer: &Buffer<T>) -> Result<()> {
        let arg = self.arg(index)?;
        anyhow::ensure!(
            arg.cat == ArgCat::Mmap,
            "cannot set argument '{}' as an mmap; it is a {}",
            arg.name,
            arg.cat
        );
        let tag = buffer.tag();
        if tag.is_store() {
            self.store_indices.insert(index);
        }
        if tag.is_load() {
            self.load_indices.insert(index);
        }
        self.buffers.insert(index, ErasedBuffer::of(buffer));
        Ok(())
    }

    /// Binds a stream argument to the shared-memory queue file at `path`.
    pub fn set_stream_arg(&mut self, index: usize, path: impl Into<PathBuf>) -> Result<()> {
        let arg = self.arg(index)?;
        anyhow::ensure!(
            arg.cat == ArgCat::Stream,
            "cannot set argument '{}' as a stream; it is a {}",
            arg.name,
            arg.cat
        );
        self.streams.insert(index, path.into());
        Ok(())
    }

    /// Removes `index` from both the load and store sets, returning the
    /// number of sets it was actually a member of (0, 1, or 2).
    pub fn suspend_buffer(&mut self, index: usize) -> usize {
        let removed_load = self.load_indices.remove(&index) as usize;
        let removed_store = self.store_indices.remove(&index) as usize;
        removed_load + removed_store
    }

    /// Schedules a host-to-device transfer; the actual write happens lazily,
    /// on the next `exec`, matching `WriteToDevice`/`WriteToDeviceImpl`.
    pub fn write_to_device(&mut self) {
        self.write_to_device_scheduled = true;
    }

    fn write_to_device_impl(&mut self) -> Result<()> {
        let tic = Instant::now();
        for &index in &self.load_indices {
            let buffer = self
                .buffers
                .get(&index)
                .with_context(|| format!("argument #{index} is in the load set but has no buffer bound"))?;
            let path = input_data_path(self.work_dir.path(), index);
            File::create(&path)
                .and_then(|mut f| f.write_all(buffer.as_bytes()))
                .with_context(|| format!("writing input data for argument #{index} to '{}'", path.display()))?;
        }
        self.load_time = tic.elapsed();
        Ok(())
    }

    /// Schedules a device-to-host transfer; the actual read happens lazily,
    /// inside `finish`, matching `ReadFromDevice`/`ReadFromDeviceImpl`.
    pub fn read_from_device(&mut self) {
        self.read_from_device_scheduled = true;
    }

    fn read_from_device_impl(&mut self) -> Result<()> {
        let tic = Instant::now();
        for &index in &self.store_indices {
            let buffer = self
                .buffers
                .get(&index)
                .with_context(|| format!("argument #{index} is in the store set but has no buffer bound"))?;
            let path = output_data_path(self.work_dir.path(), index);
            let mut data = Vec::new();
            File::open(&path)
                .and_then(|mut f| f.read_to_end(&mut data))
                .with_context(|| format!("reading output data for argument #{index} from '{}'", path.display()))?;
            let dst = buffer.as_mut_bytes();
            anyhow::ensure!(
                data.len() == dst.len(),
                "output data for argument #{index} is {} bytes, expected {}",
                data.len(),
                dst.len()
            );
            dst.copy_from_slice(&data);
        }
        self.store_time = tic.elapsed();
        Ok(())
    }

    /// Writes `config.json` and spawns the simulator, non-blockingly.
    /// Mirrors `Exec()`: a scheduled `write_to_device` runs first, and
    /// `xosim_resume_from_post_sim` skips the spawn entirely (leaving
    /// `finish` to fail, the same quirk the original has).
    pub fn exec(&mut self) -> Result<()> {
        if self.write_to_device_scheduled {
            self.write_to_device_impl()?;
        }

        let tic = Instant::now();
        let work_dir = self.work_dir.path().to_path_buf();

        let scalar_to_val: serde_json::Map<String, serde_json::Value> = self
            .scalars
            .iter()
            .map(|(index, hex)| (index.to_string(), json!(hex)))
            .collect();
        let axi_to_c_array_size: serde_json::Map<String, serde_json::Value> = self
            .buffers
            .iter()
            .map(|(index, buf)| (index.to_string(), json!(buf.count)))
            .collect();
        let axi_to_data_file: serde_json::Map<String, serde_json::Value> = self
            .buffers
            .keys()
            .map(|index| (index.to_string(), json!(input_data_path(&work_dir, *index).display().to_string())))
            .collect();
        let axis_to_data_file: serde_json::Map<String, serde_json::Value> = self
            .streams
            .iter()
            .map(|(index, path)| (index.to_string(), json!(path.display().to_string())))
            .collect();

        let config = json!({
            "xo_path": self.xo_path.display().to_string(),
            "scalar_to_val": scalar_to_val,
            "axi_to_c_array_size": axi_to_c_array_size,
            "axi_to_data_file": axi_to_data_file,
            "axis_to_data_file": axis_to_data_file,
        });
        let config_path = config_path(&work_dir);
        std::fs::write(&config_path, serde_json::to_vec_pretty(&config)?)
            .with_context(|| format!("writing '{}'", config_path.display()))?;

        if self.flags.xosim_resume_from_post_sim {
            return Ok(());
        }

        let executable = self
            .flags
            .xosim_executable
            .clone()
            .unwrap_or_else(|| "tapa-fast-cosim".to_string());
        let mut cmd = Command::new(executable);
        cmd.arg(format!("--config_path={}", config_path.display()));
        cmd.arg(format!("--tb_output_dir={}", work_dir.join("output").display()));
        cmd.arg("--launch_simulation");
        if self.flags.xosim_start_gui {
            cmd.arg("--start_gui");
        }
        if self.flags.xosim_save_waveform {
            cmd.arg("--save_waveform");
        }
        if self.flags.xosim_setup_only {
            cmd.arg("--setup_only");
        }
        if let Some(part_num) = &self.flags.xosim_part_num {
            cmd.arg(format!("--part_num={part_num}"));
        }

        let child = cmd.spawn().context("failed to spawn tapa-fast-cosim")?;
        self.context = Some(ExecContext { start: tic, child });
        Ok(())
    }

    /// Waits for the simulator to exit, propagating a nonzero exit code as a
    /// fatal error, then runs any scheduled `read_from_device`. Exits the
    /// whole process immediately when `xosim_setup_only` is set, matching
    /// the original's `exit(0)` in the same spot.
    pub fn finish(&mut self) -> Result<()> {
        let context = self
            .context
            .as_mut()
            .context("exec() must be called before finish()")?;
        let status = context.child.wait().context("waiting for tapa-fast-cosim")?;
        anyhow::ensure!(status.success(), "tapa-fast-cosim failed with {status}");

        if self.flags.xosim_setup_only {
            std::process::exit(0);
        }

        self.compute_time = context.start.elapsed();

        if self.read_from_device_scheduled {
            self.read_from_device_impl()?;
        }
        Ok(())
    }

    /// Non-blocking check of whether the simulator has exited.
    pub fn is_finished(&mut self) -> Result<bool> {
        match &mut self.context {
            Some(context) => Ok(context.child.try_wait()?.is_some()),
            None => Ok(false),
        }
    }

    pub fn args_info(&self) -> &[ArgInfo] {
        &self.args
    }

    pub fn load_time_ns(&self) -> i64 {
        self.load_time.as_nanos() as i64
    }

    pub fn compute_time_ns(&self) -> i64 {
        self.compute_time.as_nanos() as i64
    }

    pub fn store_time_ns(&self) -> i64 {
        self.store_time.as_nanos() as i64
    }

    pub fn load_bytes(&self) -> usize {
        self.load_indices
            .iter()
            .filter_map(|index| self.buffers.get(index))
            .map(ErasedBuffer::size_in_bytes)
            .sum()
    }

    pub fn store_bytes(&self) -> usize {
        self.store_indices
            .iter()
            .filter_map(|index| self.buffers.get(index))
            .map(ErasedBuffer::size_in_bytes)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const KERNEL_XML: &str = r#"
        <root><kernel><args>
          <arg id="0" name="n" type="int" addressQualifier="0"/>
          <arg id="1" name="a" type="int*" addressQualifier="1"/>
          <arg id="2" name="s" type="hls::stream<int>&" addressQualifier="4"/>
        </args></kernel></root>
    "#;

    fn fake_bitstream(dir: &Path) -> PathBuf {
        let path = dir.join("kernel.xo");
        let file = File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("kernel.xml", options).unwrap();
        zip.write_all(KERNEL_XML.as_bytes()).unwrap();
        zip.finish().unwrap();
        path
    }

    fn device(work_dir: &Path) -> CosimDevice {
        let xo_path = fake_bitstream(work_dir);
        let flags = CosimFlags {
            xosim_work_dir: Some(work_dir.join("work").to_string_lossy().into_owned()),
            ..Default::default()
        };
        CosimDevice::new(xo_path, flags).unwrap()
    }

    #[test]
    fn constructor_parses_args_info_from_bitstream() {
        let dir = tempfile::tempdir().unwrap();
        let dev = device(dir.path());
        assert_eq!(dev.args_info().len(), 3);
        assert_eq!(dev.args_info()[1].cat, ArgCat::Mmap);
    }

    #[test]
    fn scalar_arg_renders_little_endian_hex() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device(dir.path());
        dev.set_scalar_arg(0, 0x1234_i32).unwrap();
        assert_eq!(dev.scalars.get(&0).map(String::as_str), Some("'h00001234"));
    }

    #[test]
    fn scalar_arg_rejects_non_scalar_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device(dir.path());
        assert!(dev.set_scalar_arg(1, 0_i32).is_err());
    }

    #[test]
    fn buffer_arg_populates_load_and_store_sets_by_tag() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device(dir.path());
        let mut data = [1_i32, 2, 3, 4];
        let buf = unsafe { Buffer::new(data.as_mut_ptr(), data.len(), BufferTag::ReadWrite) };
        dev.set_buffer_arg(1, &buf).unwrap();
        assert!(dev.load_indices.contains(&1));
        assert!(dev.store_indices.contains(&1));
        assert_eq!(dev.load_bytes(), 16);
    }

    #[test]
    fn suspend_buffer_removes_from_both_sets_and_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device(dir.path());
        let mut data = [1_i32];
        let buf = unsafe { Buffer::new(data.as_mut_ptr(), 1, BufferTag::ReadWrite) };
        dev.set_buffer_arg(1, &buf).unwrap();
        assert_eq!(dev.suspend_buffer(1), 2);
        assert_eq!(dev.suspend_buffer(1), 0);
    }

    #[test]
    fn write_to_device_impl_writes_one_file_per_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device(dir.path());
        let mut data = [5_u8, 6, 7, 8];
        let buf = unsafe { Buffer::new(data.as_mut_ptr(), data.len(), BufferTag::WriteOnly) };
        dev.set_buffer_arg(1, &buf).unwrap();
        dev.write_to_device_impl().unwrap();
        let written = std::fs::read(input_data_path(dev.work_dir.path(), 1)).unwrap();
        assert_eq!(written, vec![5, 6, 7, 8]);
    }

    #[test]
    fn write_to_device_impl_skips_read_only_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device(dir.path());
        let mut data = [5_u8, 6, 7, 8];
        let buf = unsafe { Buffer::new(data.as_mut_ptr(), data.len(), BufferTag::ReadOnly) };
        dev.set_buffer_arg(1, &buf).unwrap();
        dev.write_to_device_impl().unwrap();
        assert!(!input_data_path(dev.work_dir.path(), 1).exists());
        assert_eq!(dev.load_bytes(), 0);
    }

    #[test]
    fn exec_without_scheduled_write_skips_data_files_but_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device(dir.path());
        dev.flags.xosim_resume_from_post_sim = true;
        dev.exec().unwrap();
        assert!(config_path(dev.work_dir.path()).exists());
        assert!(dev.context.is_none());
    }

    #[test]
    fn finish_without_exec_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device(dir.path());
        assert!(dev.finish().is_err());
    }
}
