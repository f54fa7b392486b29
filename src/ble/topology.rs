//! GATT topology inspection.
//!
//! After a connection is established the tester lists the characteristics of
//! the device's first primary service. Other services are deliberately not
//! walked: the chooser hint orders the requested service first, and that is
//! the one being inspected.

use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::adapter::GattServer;
use crate::error::{Error, Result};
use crate::session::{DeviceSession, Ticket};

/// Identifier of one characteristic. Payload contents are never read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicDescriptor {
    /// Characteristic UUID.
    pub uuid: Uuid,
}

impl CharacteristicDescriptor {
    /// Create a descriptor for a characteristic UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid }
    }
}

impl fmt::Display for CharacteristicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl From<Uuid> for CharacteristicDescriptor {
    fn from(uuid: Uuid) -> Self {
        Self::new(uuid)
    }
}

/// One-shot characteristic fetch tied to a single connection.
///
/// Nothing happens until [`fetch`](Self::fetch) or
/// [`into_stream`](Self::into_stream) is driven; both consume the session, so
/// a fetch cannot be restarted. A new connection hands out a new session.
pub struct TopologySession {
    gatt: Arc<dyn GattServer>,
    session: Arc<DeviceSession>,
    ticket: Ticket,
    timeout: Duration,
}

impl TopologySession {
    pub(crate) fn new(
        gatt: Arc<dyn GattServer>,
        session: Arc<DeviceSession>,
        ticket: Ticket,
        timeout: Duration,
    ) -> Self {
        Self {
            gatt,
            session,
            ticket,
            timeout,
        }
    }

    /// The connection this fetch belongs to.
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Enumerate the characteristics of service index 0.
    ///
    /// Zero services produce an empty list. The result is published to the
    /// session only while the connection it was started for is still the
    /// current one; otherwise [`Error::Superseded`] is returned.
    pub async fn fetch(self) -> Result<Vec<CharacteristicDescriptor>> {
        let outcome = match tokio::time::timeout(self.timeout, enumerate(self.gatt.as_ref())).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout),
        };

        match outcome {
            Ok(characteristics) => {
                if !self.session.apply_topology(self.ticket, Ok(characteristics.as_slice())) {
                    debug!("Discarding characteristics for stale session {}", self.ticket);
                    return Err(Error::Superseded);
                }
                info!("Fetched {} characteristics", characteristics.len());
                Ok(characteristics)
            }
            Err(e) => {
                if !self.session.apply_topology(self.ticket, Err(&e)) {
                    debug!("Ignoring topology failure for stale session {}: {}", self.ticket, e);
                    return Err(Error::Superseded);
                }
                warn!("Failed to fetch characteristics: {}", e);
                Err(Error::TopologyFetchFailed {
                    source: Box::new(e),
                })
            }
        }
    }

    /// Same as [`fetch`](Self::fetch), yielding descriptors one by one.
    ///
    /// A failed fetch yields a single error item.
    pub fn into_stream(self) -> BoxStream<'static, Result<CharacteristicDescriptor>> {
        stream::once(self.fetch())
            .flat_map(|outcome| match outcome {
                Ok(characteristics) => stream::iter(characteristics.into_iter().map(Ok)).boxed(),
                Err(e) => stream::iter(std::iter::once(Err(e))).boxed(),
            })
            .boxed()
    }
}

impl fmt::Debug for TopologySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologySession")
            .field("ticket", &self.ticket)
            .field("timeout", &self.timeout)
            .finish()
    }
}

async fn enumerate(gatt: &dyn GattServer) -> Result<Vec<CharacteristicDescriptor>> {
    let services = gatt.primary_services().await?;
    debug!("Device reports {} primary services", services.len());

    let Some(first) = services.first() else {
        return Ok(Vec::new());
    };

    debug!("Listing characteristics of service {}", first.uuid());
    first.characteristics().await
}
