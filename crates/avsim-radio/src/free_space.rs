//! The shared free-space channel.

use crate::error::RadioError;
use crate::local_air::{LocalAir, Transmission};
use crate::propagation::{self, Position, DEFAULT_FREQUENCY_HZ};
use avsim_common::{Cycles, NodeId};
use avsim_metrics::metric_defs;
use avsim_sync::Synchronizer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Transmitter configuration of one radio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadioSettings {
    /// CC1000 power register setting.
    #[serde(default = "default_power")]
    pub power: u8,
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
}

fn default_power() -> u8 {
    15
}

fn default_frequency() -> f64 {
    DEFAULT_FREQUENCY_HZ
}

impl Default for RadioSettings {
    fn default() -> Self {
        RadioSettings {
            power: default_power(),
            frequency_hz: default_frequency(),
        }
    }
}

/// The channel shared by all radios of a run.
///
/// Times are reference cycles. Every channel access waits for neighbors
/// through the run's synchronizer before touching shared state and never
/// advances any clock itself.
pub trait RadioAir: Send + Sync {
    /// Attach a radio; it becomes a neighbor of every attached radio.
    fn add_radio(&self, node: NodeId, position: Position, settings: RadioSettings);

    /// Detach a radio. No-op if absent.
    fn remove_radio(&self, node: NodeId);

    /// Put one byte on the air starting at `time`.
    fn write_channel(&self, node: NodeId, data: u8, time: Cycles) -> Result<(), RadioError>;

    /// Inverted RSSI seen by `node` at `time`.
    fn sample_channel(&self, node: NodeId, time: Cycles) -> Result<u16, RadioError>;

    /// The byte completing at `time`, if enough bits are recoverable.
    fn read_channel(&self, node: NodeId, time: Cycles) -> Result<Option<u8>, RadioError>;
}

struct Station {
    air: LocalAir,
    settings: RadioSettings,
    tx_bytes: metrics::Counter,
    channel_samples: metrics::Counter,
}

impl Station {
    fn new(air: LocalAir, settings: RadioSettings) -> Self {
        let label = air.node().to_string();
        Station {
            air,
            settings,
            tx_bytes: metrics::counter!(metric_defs::RADIO_TX_BYTES.name, "node" => label.clone()),
            channel_samples: metrics::counter!(metric_defs::RADIO_CHANNEL_SAMPLES.name, "node" => label),
        }
    }
}

/// Free-space propagation over a distance-sorted neighbor graph.
pub struct FreeSpaceAir {
    sync: Arc<dyn Synchronizer>,
    stations: Mutex<BTreeMap<NodeId, Station>>,
}

impl FreeSpaceAir {
    pub fn new(sync: Arc<dyn Synchronizer>) -> Self {
        FreeSpaceAir {
            sync,
            stations: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of attached radios.
    pub fn radios(&self) -> usize {
        self.stations.lock().len()
    }

    /// Snapshot of one radio's channel state.
    pub fn local_air(&self, node: NodeId) -> Option<LocalAir> {
        self.stations.lock().get(&node).map(|s| s.air.clone())
    }

    fn with_station<R>(
        &self,
        node: NodeId,
        time: Cycles,
        f: impl FnOnce(&mut LocalAir) -> R,
    ) -> Result<R, RadioError> {
        self.sync.wait_for_neighbors(node, time)?;
        let mut stations = self.stations.lock();
        let station = stations
            .get_mut(&node)
            .ok_or(RadioError::UnknownRadio { node })?;
        station.air.prune(time);
        station.channel_samples.increment(1);
        Ok(f(&mut station.air))
    }
}

impl RadioAir for FreeSpaceAir {
    fn add_radio(&self, node: NodeId, position: Position, settings: RadioSettings) {
        let mut stations = self.stations.lock();
        let mut air = LocalAir::new(node, position);
        for (&other, station) in stations.iter_mut() {
            station.air.add_neighbor(node, &position);
            air.add_neighbor(other, &station.air.position());
        }
        stations.insert(node, Station::new(air, settings));
        debug!(%node, x = position.x, y = position.y, z = position.z, power = settings.power, "radio attached");
    }

    fn remove_radio(&self, node: NodeId) {
        let mut stations = self.stations.lock();
        if stations.remove(&node).is_some() {
            for station in stations.values_mut() {
                station.air.remove_neighbor(node);
            }
            debug!(%node, "radio detached");
        }
    }

    fn write_channel(&self, node: NodeId, data: u8, time: Cycles) -> Result<(), RadioError> {
        self.sync.wait_for_neighbors(node, time)?;
        let mut stations = self.stations.lock();
        let sender = stations.get(&node).ok_or(RadioError::UnknownRadio { node })?;
        sender.tx_bytes.increment(1);

        let tx_power = propagation::transmit_power(sender.settings.power);
        let frequency = sender.settings.frequency_hz;
        let heard: Vec<_> = sender
            .air
            .neighbors()
            .iter()
            .filter_map(|n| {
                let power = propagation::received_power(tx_power, frequency, n.distance);
                propagation::audible(power).then_some((n.node, power))
            })
            .collect();

        for &(neighbor, power) in &heard {
            if let Some(station) = stations.get_mut(&neighbor) {
                // receivers never look back past the writer's time
                station.air.prune(time);
                station.air.add_packet(Transmission::new(node, data, time, power));
            }
        }

        trace!(%node, data, time, receivers = heard.len(), "byte transmitted");
        Ok(())
    }

    fn sample_channel(&self, node: NodeId, time: Cycles) -> Result<u16, RadioError> {
        self.with_station(node, time, |air| air.sample_rssi(time))
    }

    fn read_channel(&self, node: NodeId, time: Cycles) -> Result<Option<u8>, RadioError> {
        self.with_station(node, time, |air| air.read_byte(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_air::{BYTE_PERIOD, RSSI_BUSY, RSSI_IDLE};
    use avsim_clock::MainClock;
    use avsim_common::{ClockRate, SyncError};
    use avsim_sync::BarrierSnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts channel waits without blocking.
    #[derive(Default)]
    struct CountingSync {
        waits: AtomicUsize,
    }

    impl Synchronizer for CountingSync {
        fn register(&self, _: NodeId, _: &mut MainClock) -> Result<(), SyncError> {
            Ok(())
        }
        fn deregister(&self, _: NodeId, _: &mut MainClock) -> Result<(), SyncError> {
            Ok(())
        }
        fn wait_for_neighbors(&self, _: NodeId, _: Cycles) -> Result<(), SyncError> {
            self.waits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn global_time(&self) -> u64 {
            0
        }
        fn reference_rate(&self) -> ClockRate {
            ClockRate::MICA2
        }
        fn stop(&self) {}
        fn snapshot(&self) -> BarrierSnapshot {
            BarrierSnapshot {
                round: 0,
                goal: 0,
                arrived: vec![],
                sampling: vec![],
                missing: vec![],
                pending_joins: vec![],
                pending_leaves: vec![],
                interrupted: false,
            }
        }
    }

    fn air_with(positions: &[(u32, f64)]) -> (FreeSpaceAir, Arc<CountingSync>) {
        let sync = Arc::new(CountingSync::default());
        let air = FreeSpaceAir::new(sync.clone());
        for &(id, x) in positions {
            air.add_radio(NodeId::new(id), Position::new(x, 0.0, 0.0), RadioSettings::default());
        }
        (air, sync)
    }

    #[test]
    fn test_neighbor_graph_is_symmetric() {
        let (air, _) = air_with(&[(1, 0.0), (2, 5.0), (3, 1.0)]);
        let near: Vec<_> = air
            .local_air(NodeId::new(1))
            .unwrap()
            .neighbors()
            .iter()
            .map(|n| n.node.get())
            .collect();
        assert_eq!(near, vec![3, 2]);

        air.remove_radio(NodeId::new(3));
        assert_eq!(air.local_air(NodeId::new(2)).unwrap().neighbors().len(), 1);
        assert_eq!(air.radios(), 2);
    }

    #[test]
    fn test_every_access_waits_for_neighbors() {
        let (air, sync) = air_with(&[(1, 0.0), (2, 1.0)]);
        air.write_channel(NodeId::new(1), 0x42, 0).unwrap();
        air.sample_channel(NodeId::new(2), 100).unwrap();
        air.read_channel(NodeId::new(2), BYTE_PERIOD).unwrap();
        assert_eq!(sync.waits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_nearby_radio_hears_byte() {
        let (air, _) = air_with(&[(1, 0.0), (2, 1.0)]);
        air.write_channel(NodeId::new(1), 0x42, 1000).unwrap();

        assert_eq!(air.sample_channel(NodeId::new(2), 2000), Ok(RSSI_BUSY));
        assert_eq!(air.read_channel(NodeId::new(2), 1000 + BYTE_PERIOD), Ok(Some(0x42)));
        // the sender does not hear itself
        assert_eq!(air.local_air(NodeId::new(1)).unwrap().packets().count(), 0);
    }

    #[test]
    fn test_distant_radio_hears_nothing() {
        let (air, _) = air_with(&[(1, 0.0), (2, 5_000.0)]);
        air.write_channel(NodeId::new(1), 0x42, 1000).unwrap();
        assert_eq!(air.sample_channel(NodeId::new(2), 2000), Ok(RSSI_IDLE));
        assert_eq!(air.read_channel(NodeId::new(2), 1000 + BYTE_PERIOD), Ok(None));
    }

    #[test]
    fn test_silent_receiver_buffer_stays_bounded() {
        let (air, _) = air_with(&[(1, 0.0), (2, 3.0)]);
        for i in 0..10_000u64 {
            air.write_channel(NodeId::new(1), i as u8, i * 10 * BYTE_PERIOD).unwrap();
        }
        // node 2 never samples; only the latest byte is still observable
        let buffered = air.local_air(NodeId::new(2)).unwrap().packets().count();
        assert_eq!(buffered, 1);
    }

    #[test]
    fn test_near_sender_captures_the_receiver() {
        let (air, _) = air_with(&[(1, 0.0), (2, 1.0), (3, 10.0)]);
        air.write_channel(NodeId::new(3), 0x11, 1000).unwrap();
        air.write_channel(NodeId::new(2), 0x99, 1100).unwrap();

        assert_eq!(air.read_channel(NodeId::new(1), 1100 + BYTE_PERIOD), Ok(Some(0x99)));
    }

    #[test]
    fn test_unknown_radio() {
        let (air, _) = air_with(&[(1, 0.0)]);
        assert_eq!(
            air.write_channel(NodeId::new(7), 0, 0),
            Err(RadioError::UnknownRadio {
                node: NodeId::new(7)
            })
        );
    }
}
