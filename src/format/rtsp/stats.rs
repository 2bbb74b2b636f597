use tokio::time::Instant;

use crate::format::rtcp::{ntp_middle, ntp_to_millis, ReceptionReport};

/// Per-track reception statistics, fed by every RTP packet and sender
/// report that arrives on the track's channels.
#[derive(Debug, Clone)]
pub struct ReceptionStats {
    /// Source learned from the first packet
    pub ssrc: Option<u32>,
    /// Total number of RTP packets received
    pub packets_received: u32,
    /// Total bytes of media data received
    pub bytes_received: u64,
    /// Packets missing from sequence discontinuities
    pub packets_lost: u32,
    /// Interarrival jitter in timestamp units (RFC 3550 A.8)
    pub jitter: f64,
    clock_rate: u32,
    last_seq: Option<u16>,
    cycles: u32,
    epoch: Option<Instant>,
    last_transit: Option<f64>,
    last_sr: Option<(u32, Instant)>,
    sr_mapping: Option<(u32, u64)>,
    expected_prior: u32,
    received_prior: u32,
}

impl ReceptionStats {
    /// Statistics for a track clocked at `clock_rate`.
    pub fn new(clock_rate: u32) -> Self {
        Self {
            ssrc: None,
            packets_received: 0,
            bytes_received: 0,
            packets_lost: 0,
            jitter: 0.0,
            clock_rate: clock_rate.max(1),
            last_seq: None,
            cycles: 0,
            epoch: None,
            last_transit: None,
            last_sr: None,
            sr_mapping: None,
            expected_prior: 0,
            received_prior: 0,
        }
    }

    /// Records one packet. Returns the number of packets skipped before it.
    pub fn update(
        &mut self,
        ssrc: u32,
        seq: u16,
        timestamp: u32,
        bytes: usize,
        arrival: Instant,
    ) -> u32 {
        self.ssrc.get_or_insert(ssrc);
        self.packets_received += 1;
        self.bytes_received += bytes as u64;

        let mut gap = 0;
        if let Some(last) = self.last_seq {
            let delta = seq.wrapping_sub(last);
            if delta == 0 || delta >= 0x8000 {
                // Duplicate or late; leave the highest sequence alone.
                return 0;
            }
            gap = (delta - 1) as u32;
            self.packets_lost += gap;
            if seq < last {
                self.cycles += 1 << 16;
            }
        }
        self.last_seq = Some(seq);

        let epoch = *self.epoch.get_or_insert(arrival);
        let arrival_units = arrival.duration_since(epoch).as_secs_f64() * self.clock_rate as f64;
        let transit = arrival_units - timestamp as f64;
        if let Some(prev) = self.last_transit {
            let d = (transit - prev).abs();
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.last_transit = Some(transit);
        gap
    }

    /// Records a sender report for this track's source.
    pub fn on_sender_report(&mut self, ntp_timestamp: u64, rtp_timestamp: u32, arrival: Instant) {
        self.last_sr = Some((ntp_middle(ntp_timestamp), arrival));
        self.sr_mapping = Some((rtp_timestamp, ntp_timestamp));
    }

    /// Wall-clock time of an RTP timestamp, in milliseconds since 1900,
    /// once a sender report has anchored the clock.
    pub fn wallclock_millis(&self, rtp_timestamp: u32) -> Option<u64> {
        let (sr_rtp, sr_ntp) = self.sr_mapping?;
        let delta = rtp_timestamp.wrapping_sub(sr_rtp) as i32 as i64;
        let millis = ntp_to_millis(sr_ntp) as i64 + delta * 1000 / self.clock_rate as i64;
        u64::try_from(millis).ok()
    }

    /// Extended highest sequence number received.
    pub fn highest_seq(&self) -> u32 {
        self.cycles + self.last_seq.map_or(0, u32::from)
    }

    /// Builds a receiver report block, or `None` before the first packet.
    pub fn report(&mut self, now: Instant) -> Option<ReceptionReport> {
        let ssrc = self.ssrc?;

        let expected = self.packets_received + self.packets_lost;
        let expected_interval = expected.saturating_sub(self.expected_prior);
        let received_interval = self.packets_received.saturating_sub(self.received_prior);
        let lost_interval = expected_interval.saturating_sub(received_interval);
        self.expected_prior = expected;
        self.received_prior = self.packets_received;

        let fraction_lost = if expected_interval == 0 {
            0
        } else {
            ((lost_interval << 8) / expected_interval).min(255) as u8
        };

        let (last_sr, delay_last_sr) = match self.last_sr {
            // DLSR is expressed in units of 1/65536 s.
            Some((lsr, at)) => (lsr, (now.duration_since(at).as_secs_f64() * 65536.0) as u32),
            None => (0, 0),
        };

        Some(ReceptionReport {
            ssrc,
            fraction_lost,
            packets_lost: self.packets_lost & 0x00FF_FFFF,
            highest_seq: self.highest_seq(),
            jitter: self.jitter as u32,
            last_sr,
            delay_last_sr,
        })
    }
}
