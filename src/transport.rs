use crate::prelude::*;

use std::time::Duration;
use tokio::net::TcpStream;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

pub const BAUD_RATE: u32 = 2400;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Opens the MK2 serial interface at 2400 8N1.
pub fn serial(device: &str) -> Result<SerialStream> {
    info!("opening serial device {} at {} baud", device, BAUD_RATE);

    let stream = tokio_serial::new(device, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(|e| anyhow!("failed to open {}: {}", device, e))?;

    Ok(stream)
}

/// Connects to a serial-over-TCP bridge, e.g. ser2net.
pub async fn tcp(host: &str) -> Result<TcpStream> {
    info!("connecting to {}", host);

    let stream = match tokio::time::timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        TcpStream::connect(host),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => bail!("failed to connect to {}: {}", host, e),
        Err(_) => bail!("connection timeout after {} seconds", CONNECT_TIMEOUT_SECS),
    };

    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY: {}", e);
    }

    info!("connected to {}", host);
    Ok(stream)
}
