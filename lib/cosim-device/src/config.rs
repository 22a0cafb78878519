//! Extra flags the cosim backend honors, mirroring the gflags the original
//! driver defines for the same knobs. Plumbed through explicitly rather than
//! read from process-global flags, since nothing else in this workspace
//! wants a global flag registry.

/// Optional overrides for `CosimDevice::exec`. Default matches the original
/// driver's defaults (no GUI, no waveform, full run, autodetected part).
#[derive(Clone, Debug, Default)]
pub struct CosimFlags {
    /// Reuse `work_dir` across runs instead of deleting it on drop.
    pub xosim_work_dir: Option<String>,
    /// Override the `tapa-fast-cosim` binary on `PATH`.
    pub xosim_executable: Option<String>,
    pub xosim_start_gui: bool,
    pub xosim_save_waveform: bool,
    pub xosim_setup_only: bool,
    pub xosim_resume_from_post_sim: bool,
    pub xosim_part_num: Option<String>,
}
