//! Voice activity gate for the recognition session.
//!
//! Classifies incoming 16-bit PCM frames into speech/silence with
//! hysteresis, so the session only streams audio to the backend while the
//! caller is actually talking.
//!
//! ## Algorithm
//!
//! RMS energy detection over raw 16-bit sample amplitudes:
//! 1. Compute RMS energy of the frame
//! 2. Compare against the configured threshold
//! 3. Accumulate consecutive voiced/quiet milliseconds
//! 4. Emit edge events when a run crosses the configured minimum duration
//!
//! The entry hysteresis (`voice_ms`) filters brief noise bursts; the exit
//! hysteresis (`silence_ms`) rides over natural mid-utterance pauses.

use tracing::debug;

/// Per-frame verdict from the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// No speech; nothing to do.
    Silence,
    /// Edge into speech. The frame that crosses the entry hysteresis.
    StartTalking,
    /// Speech is active (including brief pauses under the exit hysteresis).
    Talking,
    /// Edge out of speech after `silence_ms` of continuous quiet.
    StopTalking,
}

/// Gate tuning parameters. All hot-reconfigurable mid-session.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// RMS energy threshold in raw 16-bit amplitude units.
    pub thresh: u32,
    /// Continuous quiet required to leave speech (ms).
    pub silence_ms: u32,
    /// Continuous voice required to enter speech (ms).
    pub voice_ms: u32,
    /// Aggressiveness mode: negative uses the plain energy threshold,
    /// 0..=3 scale the effective threshold upward.
    pub mode: i32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            thresh: 400,
            silence_ms: 700,
            voice_ms: 60,
            mode: -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Quiet,
    Voiced,
}

/// Energy-based voice activity gate.
///
/// One instance per session; reset in place on every session reset, no
/// reallocation.
#[derive(Debug)]
pub struct VoiceGate {
    config: VadConfig,
    sample_rate: u32,
    state: GateState,
    /// Consecutive voiced run while quiet (ms).
    voiced_run_ms: f64,
    /// Consecutive quiet run while voiced (ms).
    quiet_run_ms: f64,
}

impl VoiceGate {
    pub fn new(sample_rate: u32, config: VadConfig) -> Self {
        Self {
            config,
            sample_rate,
            state: GateState::Quiet,
            voiced_run_ms: 0.0,
            quiet_run_ms: 0.0,
        }
    }

    /// Classify one frame of samples at the negotiated rate.
    pub fn process(&mut self, samples: &[i16]) -> VadEvent {
        if samples.is_empty() {
            return match self.state {
                GateState::Quiet => VadEvent::Silence,
                GateState::Voiced => VadEvent::Talking,
            };
        }

        let energy = rms_energy(samples);
        let frame_ms = samples.len() as f64 * 1000.0 / self.sample_rate as f64;
        let voiced = energy > self.effective_thresh() as f64;

        match self.state {
            GateState::Quiet => {
                if voiced {
                    self.voiced_run_ms += frame_ms;
                    if self.voiced_run_ms >= self.config.voice_ms as f64 {
                        debug!(
                            energy = energy as u32,
                            thresh = self.effective_thresh(),
                            "speech started"
                        );
                        self.state = GateState::Voiced;
                        self.quiet_run_ms = 0.0;
                        return VadEvent::StartTalking;
                    }
                } else {
                    self.voiced_run_ms = 0.0;
                }
                VadEvent::Silence
            }
            GateState::Voiced => {
                if voiced {
                    self.quiet_run_ms = 0.0;
                    VadEvent::Talking
                } else {
                    self.quiet_run_ms += frame_ms;
                    if self.quiet_run_ms >= self.config.silence_ms as f64 {
                        debug!(quiet_ms = self.quiet_run_ms as u32, "speech ended");
                        self.state = GateState::Quiet;
                        self.voiced_run_ms = 0.0;
                        VadEvent::StopTalking
                    } else {
                        VadEvent::Talking
                    }
                }
            }
        }
    }

    /// Reset to quiet without reallocating. Called on every session reset.
    pub fn reset(&mut self) {
        self.state = GateState::Quiet;
        self.voiced_run_ms = 0.0;
        self.quiet_run_ms = 0.0;
    }

    pub fn is_voiced(&self) -> bool {
        self.state == GateState::Voiced
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    pub fn set_thresh(&mut self, thresh: u32) {
        self.config.thresh = thresh;
    }

    pub fn set_silence_ms(&mut self, silence_ms: u32) {
        self.config.silence_ms = silence_ms;
    }

    pub fn set_voice_ms(&mut self, voice_ms: u32) {
        self.config.voice_ms = voice_ms;
    }

    pub fn set_mode(&mut self, mode: i32) {
        self.config.mode = mode;
    }

    /// Threshold after applying the aggressiveness mode: each step above
    /// zero raises it by a quarter of the base value.
    fn effective_thresh(&self) -> u32 {
        if self.config.mode < 0 {
            return self.config.thresh;
        }
        let mode = self.config.mode.min(3) as u32;
        self.config.thresh + (self.config.thresh * mode) / 4
    }
}

/// RMS energy of a frame in raw 16-bit amplitude units.
fn rms_energy(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt()
}

/// Reinterpret little-endian PCM bytes as 16-bit samples. A trailing odd
/// byte is ignored.
pub fn samples_from_pcm(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
