use candle_core::Device;

pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(dev) => { tracing::info!("embedding device: metal"); return dev; }
            Err(error) => tracing::warn!(%error, "metal unavailable, falling back to cpu"),
        }
    }
    tracing::info!("embedding device: cpu");
    Device::Cpu
}
