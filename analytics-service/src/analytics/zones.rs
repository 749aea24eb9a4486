//! Highest and lowest consuming zones.

use meter_client::domain::MeterId;
use serde::{Serialize, Serializer};

use super::round_to;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneConsumption {
    pub meter_id: MeterId,
    pub consumption: f64,
}

/// A ranked zone. `meter_id` is `None` when no zone qualified, which is
/// reported as `"N/A"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneLeader {
    #[serde(serialize_with = "zone_or_na")]
    pub meter_id: Option<MeterId>,
    pub consumption: f64,
}

impl ZoneLeader {
    const NONE: Self = Self {
        meter_id: None,
        consumption: 0.0,
    };

    fn from_zone(zone: &ZoneConsumption) -> Self {
        Self {
            meter_id: Some(zone.meter_id),
            consumption: zone.consumption,
        }
    }
}

fn zone_or_na<S: Serializer>(meter_id: &Option<MeterId>, serializer: S) -> Result<S::Ok, S::Error> {
    match meter_id {
        Some(id) => serializer.serialize_i32(*id),
        None => serializer.serialize_str("N/A"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneRanking {
    pub high_zone: ZoneLeader,
    pub low_zone: ZoneLeader,
    /// Positive consumption not attributed to the high or low zone.
    pub other_zone_consumption: f64,
}

/// Rank zones by consumption.
///
/// The high zone is the largest value; the low zone is the smallest value
/// that is strictly positive, so idle meters are never reported as the
/// lowest consumer. A tie for the high zone goes to the zone seen first; a
/// tie for the low zone goes to the zone seen last.
pub fn rank_zones(zones: &[ZoneConsumption]) -> ZoneRanking {
    let mut high: Option<usize> = None;
    let mut low: Option<usize> = None;

    for (i, zone) in zones.iter().enumerate() {
        if high.map_or(true, |h| zone.consumption > zones[h].consumption) {
            high = Some(i);
        }
        let lowest_so_far = low.map_or(true, |l| zone.consumption <= zones[l].consumption);
        if zone.consumption > 0.0 && lowest_so_far {
            low = Some(i);
        }
    }

    let other: f64 = zones
        .iter()
        .enumerate()
        .filter(|(i, z)| z.consumption > 0.0 && Some(*i) != high && Some(*i) != low)
        .map(|(_, z)| z.consumption)
        .sum();

    let leader =
        |idx: Option<usize>| idx.map_or(ZoneLeader::NONE, |i| ZoneLeader::from_zone(&zones[i]));

    ZoneRanking {
        high_zone: leader(high),
        low_zone: leader(low),
        other_zone_consumption: round_to(other, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(meter_id: MeterId, consumption: f64) -> ZoneConsumption {
        ZoneConsumption {
            meter_id,
            consumption,
        }
    }

    #[test]
    fn zero_zone_is_never_lowest() {
        let ranking = rank_zones(&[zone(1, 5.0), zone(2, 0.0), zone(3, 12.0), zone(4, 3.0)]);

        assert_eq!(ranking.high_zone.meter_id, Some(3));
        assert_eq!(ranking.high_zone.consumption, 12.0);
        assert_eq!(ranking.low_zone.meter_id, Some(4));
        assert_eq!(ranking.low_zone.consumption, 3.0);
        assert_eq!(ranking.other_zone_consumption, 5.0);
    }

    #[test]
    fn high_tie_keeps_first_low_tie_keeps_last() {
        let ranking = rank_zones(&[zone(7, 4.0), zone(2, 9.0), zone(5, 9.0), zone(8, 4.0)]);
        assert_eq!(ranking.high_zone.meter_id, Some(2));
        assert_eq!(ranking.low_zone.meter_id, Some(8));
        // Zones 7 and 5 are neither leader.
        assert_eq!(ranking.other_zone_consumption, 13.0);

        let ranking = rank_zones(&[zone(7, 4.0), zone(2, 9.0), zone(8, 4.0)]);
        assert_eq!(ranking.low_zone.meter_id, Some(8));
        assert_eq!(ranking.low_zone.consumption, 4.0);
    }

    #[test]
    fn empty_input_reports_na() {
        let ranking = rank_zones(&[]);
        assert_eq!(ranking.high_zone, ZoneLeader::NONE);
        assert_eq!(ranking.low_zone, ZoneLeader::NONE);
        assert_eq!(ranking.other_zone_consumption, 0.0);

        let json = serde_json::to_value(ranking).unwrap();
        assert_eq!(json["high_zone"]["meter_id"], "N/A");
        assert_eq!(json["low_zone"]["meter_id"], "N/A");
    }

    #[test]
    fn all_idle_zones_have_no_low_zone() {
        let ranking = rank_zones(&[zone(1, 0.0), zone(2, 0.0)]);
        assert_eq!(ranking.high_zone.meter_id, Some(1));
        assert_eq!(ranking.low_zone.meter_id, None);
        assert_eq!(ranking.other_zone_consumption, 0.0);
    }

    #[test]
    fn single_zone_is_counted_once() {
        let ranking = rank_zones(&[zone(3, 6.5)]);
        assert_eq!(ranking.high_zone.meter_id, Some(3));
        assert_eq!(ranking.low_zone.meter_id, Some(3));
        assert_eq!(ranking.other_zone_consumption, 0.0);

        let json = serde_json::to_value(ranking).unwrap();
        assert_eq!(json["high_zone"]["meter_id"], 3);
    }
}
