//! Distance-adaptive send scheduling
//!
//! Every tick the scheduler walks the connected peers and decides, per peer,
//! whether the local boat's state is due. Close peers are updated up to the
//! maximum rate, far peers at the minimum rate, and peers behind a relay at a
//! fixed slow rate regardless of distance.

use crate::entity::Boat;
use crate::error::{ConfigError, TransportError};
use crate::session::RemotePeer;
use crate::transport::{LinkQuality, PeerId, Transport};
use glam::Vec3;
use log::{debug, warn};
use shared::{
    Packet, TransformSnapshot, DATA_FLOW_EVERY_N_SENDS, NETSYNC_MAX_DISTANCE, NETSYNC_MAX_RATE_MS,
    NETSYNC_MIN_RATE_MS, NETSYNC_RELAYED_RATE_MS,
};
use std::collections::HashMap;

/// Send-rate tunables. Intervals are in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Interval for a peer at distance zero.
    pub max_rate_ms: f64,
    /// Interval for a peer at or beyond `max_distance`.
    pub min_rate_ms: f64,
    /// Interval for any peer on a relayed link.
    pub relayed_rate_ms: f64,
    pub max_distance: f32,
    /// Successful sends per data-flow notification.
    pub data_flow_every: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_rate_ms: NETSYNC_MAX_RATE_MS,
            min_rate_ms: NETSYNC_MIN_RATE_MS,
            relayed_rate_ms: NETSYNC_RELAYED_RATE_MS,
            max_distance: NETSYNC_MAX_DISTANCE,
            data_flow_every: DATA_FLOW_EVERY_N_SENDS,
        }
    }
}

impl SyncConfig {
    /// Checks that every interval is usable and the distance range is
    /// non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(ConfigError::InvalidMaxDistance(self.max_distance));
        }
        for (name, value) in [
            ("max_rate_ms", self.max_rate_ms),
            ("min_rate_ms", self.min_rate_ms),
            ("relayed_rate_ms", self.relayed_rate_ms),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidInterval { name, value });
            }
        }
        Ok(())
    }
}

/// Per-connection scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerRecord {
    /// Sender-clock time of the last transform send attempt, 0 if never.
    pub last_sent: u64,
    pub link: LinkQuality,
}

impl PeerRecord {
    /// A record that has never sent, so the first tick is always due.
    pub fn new(link: LinkQuality) -> Self {
        Self { last_sent: 0, link }
    }
}

/// Presentation hook fired on successful sends, e.g. a particle burst
/// travelling from the local boat towards the receiving peer.
pub trait SendObserver {
    fn on_data_flow(&mut self, from: Vec3, to: Vec3);
}

/// Lets one notification through every `every` calls.
#[derive(Debug, Clone)]
pub struct DataFlowThrottle {
    every: u32,
    pending: u32,
}

impl DataFlowThrottle {
    /// Fires on every `every`th send.
    pub fn new(every: u32) -> Self {
        Self { every, pending: 0 }
    }

    /// Counts one successful send. Returns true when this send should
    /// produce a notification.
    pub fn on_send(&mut self) -> bool {
        self.pending += 1;
        if self.pending < self.every {
            return false;
        }
        self.pending = 0;
        true
    }
}

/// Counters for one scheduler tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub transforms_sent: usize,
    pub animations_sent: usize,
    pub failures: usize,
    pub skipped: usize,
}

pub struct SendScheduler {
    config: SyncConfig,
    throttle: DataFlowThrottle,
    observer: Option<Box<dyn SendObserver>>,
}

impl SendScheduler {
    /// Creates a scheduler with no observer installed.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            throttle: DataFlowThrottle::new(config.data_flow_every),
            config,
            observer: None,
        }
    }

    /// Rate settings this scheduler was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Installs the hook notified on every Nth successful send,
    /// replacing any previous one.
    pub fn set_observer(&mut self, observer: Box<dyn SendObserver>) {
        self.observer = Some(observer);
    }

    /// Target interval in milliseconds for a peer at `distance`.
    ///
    /// Direct links interpolate between the max and min rate over
    /// `[0, max_distance]`. A distance that cannot be measured (NaN, or
    /// zero over a zero range) gets the min rate.
    pub fn target_interval(&self, distance: f32, link: LinkQuality) -> f64 {
        match link {
            LinkQuality::Relayed => self.config.relayed_rate_ms,
            LinkQuality::Direct => {
                let ratio = distance as f64 / self.config.max_distance as f64;
                let scale = if ratio.is_nan() {
                    1.0
                } else {
                    ratio.clamp(0.0, 1.0)
                };
                (1.0 - scale) * self.config.max_rate_ms + scale * self.config.min_rate_ms
            }
        }
    }

    /// True once at least `interval` ms have passed since the last send.
    /// A clock that went backwards counts as no time passed.
    pub fn is_due(record: &PeerRecord, now: u64, interval: f64) -> bool {
        now.saturating_sub(record.last_sent) as f64 >= interval
    }

    /// Sends the local boat's state to every peer that is due at `now`.
    ///
    /// The transform snapshot is captured once and shared by all peers in the
    /// tick; the animation snapshot is captured on the first successful
    /// transform send and follows it to each receiving peer. A failed send
    /// still counts as sent for rate limiting.
    pub fn tick(
        &mut self,
        now: u64,
        local: &Boat,
        peers: &mut HashMap<PeerId, RemotePeer>,
        transport: &mut dyn Transport,
    ) -> TickReport {
        let mut report = TickReport::default();
        let local_transform = local.world_transform();
        let mut transform_packet: Option<Packet> = None;
        let mut animation_packet: Option<Packet> = None;

        let mut ids: Vec<PeerId> = peers.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let Some(peer) = peers.get_mut(&id) else {
                report.skipped += 1;
                continue;
            };

            let target = peer.boat.world_transform().translation;
            let distance = target.distance(local_transform.translation);
            let interval = self.target_interval(distance, peer.record.link);
            if !Self::is_due(&peer.record, now, interval) {
                continue;
            }

            report.due += 1;
            peer.record.last_sent = now;

            let packet = transform_packet.get_or_insert_with(|| {
                Packet::Transform(TransformSnapshot::capture(&local_transform, now))
            });
            match transport.send(id, packet) {
                Ok(()) => {
                    report.transforms_sent += 1;
                    self.notify_data_flow(local_transform.translation, target);
                }
                Err(TransportError::PeerGone(_)) => {
                    debug!("Peer {} went away before its transform send", id);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Error sending transform packet to peer {}: {}", id, e);
                    report.failures += 1;
                    continue;
                }
            }

            let packet =
                animation_packet.get_or_insert_with(|| Packet::Animation(local.animation.snapshot(now)));
            match transport.send(id, packet) {
                Ok(()) => report.animations_sent += 1,
                Err(e) => {
                    warn!("Error sending animation packet to peer {}: {}", id, e);
                    report.failures += 1;
                }
            }
        }

        report
    }

    fn notify_data_flow(&mut self, from: Vec3, to: Vec3) {
        if !self.throttle.on_send() {
            return;
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.on_data_flow(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RemotePeer;
    use assert_approx_eq::assert_approx_eq;
    use shared::Transform;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    #[derive(Default)]
    struct MockTransport {
        sent: Vec<(PeerId, Packet)>,
        failing: HashSet<PeerId>,
        gone: HashSet<PeerId>,
    }

    impl Transport for MockTransport {
        fn send(&mut self, peer: PeerId, packet: &Packet) -> Result<(), TransportError> {
            if self.gone.contains(&peer) {
                return Err(TransportError::PeerGone(peer));
            }
            if self.failing.contains(&peer) {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "channel closed",
                )));
            }
            self.sent.push((peer, packet.clone()));
            Ok(())
        }
    }

    struct CountingObserver(Rc<RefCell<usize>>);

    impl SendObserver for CountingObserver {
        fn on_data_flow(&mut self, _from: Vec3, _to: Vec3) {
            *self.0.borrow_mut() += 1;
        }
    }

    fn peer_at(id: PeerId, x: f32, link: LinkQuality) -> (PeerId, RemotePeer) {
        let mut boat = Boat::remote(id, Transform::IDENTITY);
        boat.set_world_transform(&Transform::from_translation(Vec3::new(x, 0.0, 0.0)));
        (
            id,
            RemotePeer {
                record: PeerRecord::new(link),
                boat,
            },
        )
    }

    fn sent_kinds(transport: &MockTransport, peer: PeerId) -> Vec<&'static str> {
        transport
            .sent
            .iter()
            .filter(|(id, _)| *id == peer)
            .map(|(_, packet)| packet.kind())
            .collect()
    }

    #[test]
    fn test_interval_interpolates_with_distance() {
        let scheduler = SendScheduler::new(SyncConfig::default());

        assert_approx_eq!(scheduler.target_interval(0.0, LinkQuality::Direct), 40.0, 1e-9);
        assert_approx_eq!(scheduler.target_interval(100.0, LinkQuality::Direct), 48.0, 1e-6);
        assert_approx_eq!(scheduler.target_interval(1000.0, LinkQuality::Direct), 120.0, 1e-6);
        assert_eq!(scheduler.target_interval(2000.0, LinkQuality::Direct), 200.0);
        assert_eq!(scheduler.target_interval(50_000.0, LinkQuality::Direct), 200.0);
    }

    #[test]
    fn test_relayed_interval_ignores_distance() {
        let scheduler = SendScheduler::new(SyncConfig::default());

        for distance in [0.0, 100.0, 2000.0, 1.0e6] {
            assert_eq!(scheduler.target_interval(distance, LinkQuality::Relayed), 1000.0);
        }
    }

    #[test]
    fn test_due_check() {
        let mut record = PeerRecord::new(LinkQuality::Direct);
        assert!(SendScheduler::is_due(&record, 1_000, 48.0));

        record.last_sent = 1_000;
        assert!(!SendScheduler::is_due(&record, 1_047, 48.0));
        assert!(SendScheduler::is_due(&record, 1_048, 48.0));
        assert!(!SendScheduler::is_due(&record, 900, 48.0));
    }

    #[test]
    fn test_throttle_every_third() {
        let mut throttle = DataFlowThrottle::new(3);
        let fired: Vec<bool> = (0..7).map(|_| throttle.on_send()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn test_tick_sends_transform_then_animation() {
        let mut scheduler = SendScheduler::new(SyncConfig::default());
        let mut local = Boat::local(Transform::IDENTITY);
        local.animation.set_flag(0.25);
        let mut peers: HashMap<_, _> = [peer_at(1, 10.0, LinkQuality::Direct)].into_iter().collect();
        let mut transport = MockTransport::default();

        let report = scheduler.tick(10_000, &local, &mut peers, &mut transport);

        assert_eq!(report.due, 1);
        assert_eq!(report.transforms_sent, 1);
        assert_eq!(report.animations_sent, 1);
        assert_eq!(sent_kinds(&transport, 1), vec!["transform", "animation"]);
        assert_eq!(peers[&1].record.last_sent, 10_000);

        match &transport.sent[1].1 {
            Packet::Animation(snapshot) => {
                assert_eq!(snapshot.flag_factor, 0.25);
                assert_eq!(snapshot.timestamp, 10_000);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_peers_not_due_are_skipped() {
        let mut scheduler = SendScheduler::new(SyncConfig::default());
        let local = Boat::local(Transform::IDENTITY);
        let mut peers: HashMap<_, _> = [
            peer_at(1, 100.0, LinkQuality::Direct),
            peer_at(2, 5000.0, LinkQuality::Direct),
        ]
        .into_iter()
        .collect();
        let mut transport = MockTransport::default();

        scheduler.tick(10_000, &local, &mut peers, &mut transport);
        transport.sent.clear();

        // 48 ms interval for peer 1, 200 ms for peer 2.
        let report = scheduler.tick(10_050, &local, &mut peers, &mut transport);
        assert_eq!(report.due, 1);
        assert_eq!(sent_kinds(&transport, 1).len(), 2);
        assert!(sent_kinds(&transport, 2).is_empty());

        let report = scheduler.tick(10_200, &local, &mut peers, &mut transport);
        assert_eq!(report.due, 2);
    }

    #[test]
    fn test_snapshot_shared_across_peers_in_tick() {
        let mut scheduler = SendScheduler::new(SyncConfig::default());
        let local = Boat::local(Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let mut peers: HashMap<_, _> = (1..=4)
            .map(|id| peer_at(id, id as f32 * 10.0, LinkQuality::Direct))
            .collect();
        let mut transport = MockTransport::default();

        scheduler.tick(5_000, &local, &mut peers, &mut transport);

        let transforms: Vec<&Packet> = transport
            .sent
            .iter()
            .filter(|(_, packet)| matches!(packet, Packet::Transform(_)))
            .map(|(_, packet)| packet)
            .collect();
        assert_eq!(transforms.len(), 4);
        assert!(transforms.windows(2).all(|pair| pair[0] == pair[1]));

        let animations: Vec<&Packet> = transport
            .sent
            .iter()
            .filter(|(_, packet)| matches!(packet, Packet::Animation(_)))
            .map(|(_, packet)| packet)
            .collect();
        assert_eq!(animations.len(), 4);
        assert!(animations.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_zero_max_distance_falls_back_to_min_rate() {
        let config = SyncConfig {
            max_distance: 0.0,
            ..SyncConfig::default()
        };
        let mut scheduler = SendScheduler::new(config);

        assert_eq!(scheduler.target_interval(0.0, LinkQuality::Direct), 200.0);
        assert_eq!(scheduler.target_interval(f32::NAN, LinkQuality::Direct), 200.0);
        assert_eq!(scheduler.target_interval(5.0, LinkQuality::Direct), 200.0);

        // A co-located peer keeps getting updates at the min rate
        let local = Boat::local(Transform::IDENTITY);
        let mut peers: HashMap<_, _> = [peer_at(1, 0.0, LinkQuality::Direct)].into_iter().collect();
        let mut transport = MockTransport::default();

        let due: usize = (0..100u64)
            .map(|step| scheduler.tick(1_000 + step * 1_000, &local, &mut peers, &mut transport).due)
            .sum();
        assert_eq!(due, 100);
    }

    #[test]
    fn test_nan_remote_position_still_gets_sends() {
        let mut scheduler = SendScheduler::new(SyncConfig::default());
        let local = Boat::local(Transform::IDENTITY);
        let (id, mut remote) = peer_at(1, 0.0, LinkQuality::Direct);
        remote
            .boat
            .set_world_transform(&Transform::from_translation(Vec3::splat(f32::NAN)));
        let mut peers: HashMap<_, _> = [(id, remote)].into_iter().collect();
        let mut transport = MockTransport::default();

        assert_eq!(scheduler.tick(1_000, &local, &mut peers, &mut transport).due, 1);
        assert_eq!(scheduler.tick(1_100, &local, &mut peers, &mut transport).due, 0);
        assert_eq!(scheduler.tick(1_200, &local, &mut peers, &mut transport).due, 1);
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(SyncConfig::default().validate(), Ok(()));

        for max_distance in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let config = SyncConfig {
                max_distance,
                ..SyncConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidMaxDistance(_))
            ));
        }

        let config = SyncConfig {
            min_rate_ms: -5.0,
            ..SyncConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidInterval {
                name: "min_rate_ms",
                value: -5.0
            })
        );
    }

    #[test]
    fn test_failed_send_does_not_stop_other_peers() {
        let mut scheduler = SendScheduler::new(SyncConfig::default());
        let local = Boat::local(Transform::IDENTITY);
        let mut peers: HashMap<_, _> = [
            peer_at(1, 10.0, LinkQuality::Direct),
            peer_at(2, 10.0, LinkQuality::Direct),
            peer_at(3, 10.0, LinkQuality::Direct),
        ]
        .into_iter()
        .collect();
        let mut transport = MockTransport::default();
        transport.failing.insert(2);

        let report = scheduler.tick(1_000, &local, &mut peers, &mut transport);

        assert_eq!(report.due, 3);
        assert_eq!(report.failures, 1);
        assert_eq!(report.transforms_sent, 2);
        assert_eq!(report.animations_sent, 2);
        assert!(sent_kinds(&transport, 2).is_empty());
        // The failed attempt still counts towards rate limiting.
        assert_eq!(peers[&2].record.last_sent, 1_000);

        let report = scheduler.tick(1_010, &local, &mut peers, &mut transport);
        assert_eq!(report.due, 0);
    }

    #[test]
    fn test_peer_gone_mid_tick_is_skipped() {
        let mut scheduler = SendScheduler::new(SyncConfig::default());
        let local = Boat::local(Transform::IDENTITY);
        let mut peers: HashMap<_, _> = [
            peer_at(1, 10.0, LinkQuality::Direct),
            peer_at(2, 10.0, LinkQuality::Direct),
        ]
        .into_iter()
        .collect();
        let mut transport = MockTransport::default();
        transport.gone.insert(1);

        let report = scheduler.tick(1_000, &local, &mut peers, &mut transport);

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures, 0);
        assert!(sent_kinds(&transport, 1).is_empty());
        assert_eq!(sent_kinds(&transport, 2), vec!["transform", "animation"]);
    }

    #[test]
    fn test_relayed_peer_uses_slow_rate() {
        let mut scheduler = SendScheduler::new(SyncConfig::default());
        let local = Boat::local(Transform::IDENTITY);
        let mut peers: HashMap<_, _> = [peer_at(1, 0.0, LinkQuality::Relayed)].into_iter().collect();
        let mut transport = MockTransport::default();

        assert_eq!(scheduler.tick(10_000, &local, &mut peers, &mut transport).due, 1);
        assert_eq!(scheduler.tick(10_500, &local, &mut peers, &mut transport).due, 0);
        assert_eq!(scheduler.tick(10_999, &local, &mut peers, &mut transport).due, 0);
        assert_eq!(scheduler.tick(11_000, &local, &mut peers, &mut transport).due, 1);
    }

    #[test]
    fn test_observer_is_throttled() {
        let count = Rc::new(RefCell::new(0));
        let mut scheduler = SendScheduler::new(SyncConfig::default());
        scheduler.set_observer(Box::new(CountingObserver(Rc::clone(&count))));
        let local = Boat::local(Transform::IDENTITY);
        let mut peers: HashMap<_, _> = [peer_at(1, 0.0, LinkQuality::Direct)].into_iter().collect();
        let mut transport = MockTransport::default();

        for step in 0..6u64 {
            scheduler.tick(1_000 + step * 40, &local, &mut peers, &mut transport);
        }

        assert_eq!(sent_kinds(&transport, 1).len(), 12);
        assert_eq!(*count.borrow(), 2);
    }
}
