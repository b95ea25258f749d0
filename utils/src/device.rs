use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Device;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    let target = match device_name {
        Some(name) => name,
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device"))?
            .name()?,
    };

    host.input_devices()?
        .find(|d| d.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow::anyhow!("No target device found: {}", target))
}

/// Whether the host exposes any microphone at all.
pub fn has_input_device() -> bool {
    get_host().default_input_device().is_some()
}

enum Control {
    Enable(bool),
    Stop,
}

/// A running microphone stream.
///
/// `cpal::Stream` cannot leave the thread that built it, so the stream lives on its own
/// thread and is driven through a control channel. Dropping the capture stops it.
///
/// Samples are only counted, not encoded: nothing feeds them into a peer track. Holding
/// a capture proves the microphone is available and owned, and enabling or disabling it
/// pauses that stream only.
pub struct MicCapture {
    device_name: String,
    ctrl: mpsc::Sender<Control>,
    thread: Option<JoinHandle<()>>,
    frames: Arc<AtomicU64>,
}

impl MicCapture {
    pub fn open(device_name: Option<String>) -> anyhow::Result<Self> {
        let (ctrl_tx, ctrl_rx) = mpsc::channel::<Control>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<String>>();
        let frames = Arc::new(AtomicU64::new(0));
        let counter = frames.clone();

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let built = get_or_default_input(device_name).and_then(|device| {
                    let name = device.name()?;
                    let config = device.default_input_config()?;
                    tracing::debug!("input: device={:?}, config={:?}", &name, &config);
                    let stream = device.build_input_stream(
                        &config.config(),
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            counter.fetch_add(data.len() as u64, Ordering::Relaxed);
                        },
                        move |err| tracing::error!("an error occurred on input stream: {}", err),
                        None,
                    )?;
                    stream.play()?;
                    Ok((name, stream))
                });

                let stream = match built {
                    Ok((name, stream)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Ok(ctrl) = ctrl_rx.recv() {
                    match ctrl {
                        Control::Enable(true) => {
                            if let Err(e) = stream.play() {
                                tracing::error!("failed to resume input stream: {}", e);
                            }
                        }
                        Control::Enable(false) => {
                            if let Err(e) = stream.pause() {
                                tracing::error!("failed to pause input stream: {}", e);
                            }
                        }
                        Control::Stop => break,
                    }
                }
                drop(stream);
            })?;

        let device_name = ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("capture thread exited before the stream started"))??;

        Ok(Self {
            device_name,
            ctrl: ctrl_tx,
            thread: Some(thread),
            frames,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.ctrl.send(Control::Enable(enabled)).is_err() {
            tracing::warn!("capture thread is gone, cannot set enabled={}", enabled);
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        let _ = self.ctrl.send(Control::Stop);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("capture thread panicked");
            }
            tracing::debug!(
                "input stream {} stopped after {} samples",
                self.device_name,
                self.frames_captured()
            );
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
