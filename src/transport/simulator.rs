//! Emulated network impairment.
//!
//! Every outgoing datagram passes through a [`NetworkSimulator`] before it
//! reaches the socket. The simulator may drop it, duplicate it, and hold
//! each copy back by `latency + U[0, jitter]` logical seconds. All random
//! decisions come from a seeded RNG, so a given seed and send sequence
//! always yields the same deliveries.

use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::Time;

/// Impairment parameters.
///
/// All fields default to a perfect link: no loss, no duplicates, no delay.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NetworkConditions {
    /// Base one-way delay in logical seconds.
    pub latency: Time,
    /// Extra delay sampled uniformly from `[0, jitter]` per datagram.
    pub jitter: Time,
    /// Percentage `[0, 100]` of datagrams silently dropped.
    pub packet_loss: f64,
    /// Percentage `[0, 100]` of datagrams delivered twice.
    pub duplicates: f64,
}

impl NetworkConditions {
    /// Perfect link. Useful as a baseline.
    pub fn perfect() -> Self {
        Self::default()
    }

    /// Rough public internet: 250 ms latency, 250 ms jitter, 5 % loss,
    /// 10 % duplicates.
    pub fn lossy() -> Self {
        Self {
            latency: 0.25,
            jitter: 0.25,
            packet_loss: 5.0,
            duplicates: 10.0,
        }
    }

    /// Whether datagrams pass through untouched.
    pub fn is_perfect(&self) -> bool {
        self.latency <= 0.0 && self.jitter <= 0.0 && self.packet_loss <= 0.0 && self.duplicates <= 0.0
    }
}

#[derive(Debug)]
struct InFlight {
    deliver_at: Time,
    address: SocketAddr,
    data: Vec<u8>,
}

/// Holds datagrams in flight until their delivery time.
#[derive(Debug)]
pub struct NetworkSimulator {
    conditions: NetworkConditions,
    rng: StdRng,
    in_flight: Vec<InFlight>,
}

impl NetworkSimulator {
    /// Create a simulator with reproducible randomness.
    pub fn new(conditions: NetworkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: StdRng::seed_from_u64(seed),
            in_flight: Vec::new(),
        }
    }

    /// Current impairment parameters.
    pub fn conditions(&self) -> &NetworkConditions {
        &self.conditions
    }

    /// Change impairment parameters. Datagrams already in flight keep their
    /// delivery times.
    pub fn set_conditions(&mut self, conditions: NetworkConditions) {
        self.conditions = conditions;
    }

    /// Submit a datagram at `time`. Returns how many copies were scheduled
    /// (0 when dropped, 2 when duplicated).
    pub fn send(&mut self, time: Time, address: SocketAddr, data: Vec<u8>) -> usize {
        if self.conditions.is_perfect() {
            self.in_flight.push(InFlight {
                deliver_at: time,
                address,
                data,
            });
            return 1;
        }

        if self.roll(self.conditions.packet_loss) {
            return 0;
        }

        let copies = if self.roll(self.conditions.duplicates) {
            let deliver_at = self.delivery_time(time);
            self.in_flight.push(InFlight {
                deliver_at,
                address,
                data: data.clone(),
            });
            2
        } else {
            1
        };

        let deliver_at = self.delivery_time(time);
        self.in_flight.push(InFlight {
            deliver_at,
            address,
            data,
        });
        copies
    }

    /// Remove and return every datagram due at `time`, earliest first.
    /// Datagrams with equal delivery time keep their submission order.
    pub fn drain_due(&mut self, time: Time) -> Vec<(SocketAddr, Vec<u8>)> {
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|d| d.deliver_at <= time);
        self.in_flight = pending;

        due.sort_by(|a, b| a.deliver_at.total_cmp(&b.deliver_at));
        due.into_iter().map(|d| (d.address, d.data)).collect()
    }

    /// Datagrams still in flight.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Forget everything in flight.
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }

    fn roll(&mut self, percent: f64) -> bool {
        percent > 0.0 && self.rng.gen_range(0.0..100.0) < percent
    }

    fn delivery_time(&mut self, time: Time) -> Time {
        let jitter = if self.conditions.jitter > 0.0 {
            self.rng.gen_range(0.0..=self.conditions.jitter)
        } else {
            0.0
        };
        time + self.conditions.latency.max(0.0) + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "[::1]:40000".parse().unwrap()
    }

    #[test]
    fn test_perfect_link_delivers_immediately() {
        let mut sim = NetworkSimulator::new(NetworkConditions::perfect(), 1);
        assert_eq!(sim.send(1.0, addr(), vec![1]), 1);
        assert_eq!(sim.send(1.0, addr(), vec![2]), 1);

        let due = sim.drain_due(1.0);
        assert_eq!(due, vec![(addr(), vec![1]), (addr(), vec![2])]);
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn test_latency_holds_datagrams() {
        let conditions = NetworkConditions {
            latency: 0.5,
            ..Default::default()
        };
        let mut sim = NetworkSimulator::new(conditions, 1);
        sim.send(10.0, addr(), vec![7]);

        assert!(sim.drain_due(10.4).is_empty());
        assert_eq!(sim.drain_due(10.5).len(), 1);
    }

    #[test]
    fn test_jitter_bounds() {
        let conditions = NetworkConditions {
            latency: 0.1,
            jitter: 0.2,
            ..Default::default()
        };
        let mut sim = NetworkSimulator::new(conditions, 99);
        for i in 0..200 {
            sim.send(0.0, addr(), vec![i as u8]);
        }
        assert!(sim.drain_due(0.0999).is_empty());
        assert_eq!(sim.drain_due(0.3).len(), 200);
    }

    #[test]
    fn test_total_loss_drops_everything() {
        let conditions = NetworkConditions {
            packet_loss: 100.0,
            ..Default::default()
        };
        let mut sim = NetworkSimulator::new(conditions, 3);
        for _ in 0..50 {
            assert_eq!(sim.send(0.0, addr(), vec![0]), 0);
        }
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn test_always_duplicate() {
        let conditions = NetworkConditions {
            duplicates: 100.0,
            ..Default::default()
        };
        let mut sim = NetworkSimulator::new(conditions, 3);
        assert_eq!(sim.send(0.0, addr(), vec![5]), 2);
        assert_eq!(sim.drain_due(0.0), vec![(addr(), vec![5]), (addr(), vec![5])]);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let run = |seed| {
            let mut sim = NetworkSimulator::new(NetworkConditions::lossy(), seed);
            (0..100)
                .map(|i| sim.send(i as f64 * 0.1, addr(), vec![i as u8]))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_lossy_preset() {
        let lossy = NetworkConditions::lossy();
        assert!(!lossy.is_perfect());
        assert_eq!(lossy.packet_loss, 5.0);
        assert!(NetworkConditions::perfect().is_perfect());
    }
}
