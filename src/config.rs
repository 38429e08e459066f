//! Small, plain-value configuration structs.
//!
//! Constructed once at the entry point (CLI or test) and passed by value or
//! shared reference into workers, rather than threaded through layers as
//! loose keyword-argument maps.

use crate::error::{Result, SabiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrogramBackend {
    /// Hann-windowed radix-2 Cooley-Tukey FFT. Requires a power-of-two window.
    HannStft,
    /// Direct DFT, used when `win_size` isn't a power of two.
    Alt,
}

#[derive(Debug, Clone, Copy)]
pub struct SpectrogramConfig {
    pub win_size: usize,
    pub win_overlap_ratio: f32,
    pub backend: SpectrogramBackend,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            win_size: 4096,
            win_overlap_ratio: 0.5,
            backend: SpectrogramBackend::HannStft,
        }
    }
}

impl SpectrogramConfig {
    pub fn validate(&self) -> Result<()> {
        if self.win_size == 0 {
            return Err(SabiError::InvalidConfig("win_size must be positive".into()));
        }
        if self.backend == SpectrogramBackend::HannStft && !self.win_size.is_power_of_two() {
            return Err(SabiError::InvalidConfig(
                "HannStft backend requires a power-of-two win_size".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.win_overlap_ratio) {
            return Err(SabiError::InvalidConfig(
                "win_overlap_ratio must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Four,
    Eight,
}

#[derive(Debug, Clone, Copy)]
pub struct PeakPickerConfig {
    pub connectivity: Connectivity,
    pub dilation: usize,
    pub erosion_iterations: usize,
    pub min_amplitude: f32,
}

impl Default for PeakPickerConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            dilation: 10,
            erosion_iterations: 1,
            min_amplitude: 10.0,
        }
    }
}

impl PeakPickerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dilation == 0 {
            return Err(SabiError::InvalidConfig(
                "dilation must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HashConfig {
    pub fanout: usize,
    pub min_time_delta: f32,
    pub max_time_delta: f32,
    pub time_bin: f32,
    pub freq_bin: f32,
    pub hash_length: usize,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            fanout: 10,
            min_time_delta: 0.0,
            max_time_delta: 100.0,
            time_bin: 0.5,
            freq_bin: 2.0,
            hash_length: 20,
        }
    }
}

impl HashConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fanout == 0 {
            return Err(SabiError::InvalidConfig("fanout must be >= 1".into()));
        }
        if self.max_time_delta <= self.min_time_delta {
            return Err(SabiError::InvalidConfig(
                "max_time_delta must be greater than min_time_delta".into(),
            ));
        }
        if self.time_bin <= 0.0 || self.freq_bin <= 0.0 {
            return Err(SabiError::InvalidConfig(
                "time_bin and freq_bin must be positive".into(),
            ));
        }
        if !(1..=40).contains(&self.hash_length) {
            return Err(SabiError::InvalidConfig(
                "hash_length must be in [1, 40]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub spectrogram: SpectrogramConfig,
    pub peaks: PeakPickerConfig,
    pub hash: HashConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spectrogram: SpectrogramConfig::default(),
            peaks: PeakPickerConfig::default(),
            hash: HashConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.spectrogram.validate()?;
        self.peaks.validate()?;
        self.hash.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlignConfig {
    pub bin_size: f32,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self { bin_size: 0.2 }
    }
}

impl AlignConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bin_size <= 0.0 {
            return Err(SabiError::InvalidConfig(
                "bin_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
