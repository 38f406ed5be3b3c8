//! One request/reply exchange on a serial line

use anneal_core::traits::{LinkError, ProtocolFault};
use anneal_hal::{ReadError, Uart};

/// Send `request` and read one reply line into `reply`
///
/// Stale input is dropped first so a late reply to an earlier request
/// cannot be taken for this one. Returns the reply length without the
/// terminator.
pub(crate) async fn transact<P: Uart>(
    port: &mut P,
    request: &[u8],
    reply: &mut [u8],
    terminator: u8,
    timeout_ms: u32,
) -> Result<usize, LinkError> {
    port.discard_input().map_err(|_| LinkError::Bus)?;
    port.write_all(request).await.map_err(|_| LinkError::Bus)?;
    port.flush().await.map_err(|_| LinkError::Bus)?;

    port.read_line(reply, terminator, timeout_ms)
        .await
        .map_err(|e| match e {
            ReadError::Timeout => LinkError::Timeout,
            ReadError::Overrun => LinkError::Protocol(ProtocolFault::Malformed),
            ReadError::Bus(_) => LinkError::Bus,
        })
}
