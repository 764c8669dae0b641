use crate::domain::enclosure_type::EnclosureType;
use crate::error::{EnclosureStatus, Result};

/// Cable group a raw connector position belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectorRange {
    Downstream,
    Upstream,
    Range0,          // internal cables, group 0
    InternalRange1,  // internal cables, group 1
    Illegal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectorClass {
    pub range: ConnectorRange,
    pub conn_id: u32,
}

/// Classify a raw connector position.
///
/// The IOSXP chassis of the Viking, Cayenne and Naga families use fixed
/// position windows; every other enclosure groups positions in multiples of
/// `max_conns`.
pub fn classify_position(encl_type: EnclosureType, position: u32, max_conns: u32) -> ConnectorClass {
    let (range, conn_id) = match encl_type {
        EnclosureType::VikingIosxp => match position {
            0..=4 => (ConnectorRange::Downstream, 0),
            5..=9 => (ConnectorRange::Upstream, 1),
            10..=33 => (ConnectorRange::InternalRange1, 2 + (position - 10) / 6),
            34..=43 => (ConnectorRange::Range0, 6 + (position - 34) / 5),
            _ => (ConnectorRange::Illegal, 0),
        },
        EnclosureType::CayenneIosxp => match position {
            0..=4 => (ConnectorRange::Downstream, 0),
            5..=9 => (ConnectorRange::Upstream, 1),
            10..=19 => (ConnectorRange::Range0, 2 + (position - 10) / 5),
            20..=28 => (ConnectorRange::InternalRange1, 4),
            _ => (ConnectorRange::Illegal, 0),
        },
        EnclosureType::NagaIosxp => match position {
            0..=4 => (ConnectorRange::Downstream, 0),
            5..=9 => (ConnectorRange::Upstream, 1),
            10..=19 => (ConnectorRange::Range0, 2 + (position - 10) / 5),
            20..=37 => (ConnectorRange::InternalRange1, 4 + (position - 20) / 9),
            _ => (ConnectorRange::Illegal, 0),
        },
        _ => {
            let m = max_conns;
            let range = if m == 0 {
                ConnectorRange::Illegal
            } else if position < m {
                ConnectorRange::Downstream
            } else if position < 2 * m {
                ConnectorRange::Upstream
            } else if position < 4 * m {
                ConnectorRange::Range0
            } else if position < 6 * m {
                ConnectorRange::InternalRange1
            } else {
                ConnectorRange::Illegal
            };
            let conn_id = if m == 0 { 0 } else { position / m };
            (range, conn_id)
        }
    };
    ConnectorClass { range, conn_id }
}

/// Same classification, but an illegal position is an error.
pub fn map_position_to_range_conn_id(
    encl_type: EnclosureType,
    position: u32,
    max_conns: u32,
) -> Result<ConnectorClass> {
    let class = classify_position(encl_type, position, max_conns);
    if class.range == ConnectorRange::Illegal {
        return Err(EnclosureStatus::InvalidConnectorPosition(position));
    }
    Ok(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_rule_partitions_positions() {
        let m = 5;
        for p in 0..m * 6 {
            let class = classify_position(EnclosureType::Viper, p, m);
            let expected = match p / m {
                0 => ConnectorRange::Downstream,
                1 => ConnectorRange::Upstream,
                2 | 3 => ConnectorRange::Range0,
                _ => ConnectorRange::InternalRange1,
            };
            assert_eq!(class.range, expected, "position {}", p);
            assert_eq!(class.conn_id, p / m);
        }
        assert_eq!(classify_position(EnclosureType::Viper, 30, m).range, ConnectorRange::Illegal);
    }

    #[test]
    fn viking_uses_fixed_windows() {
        let c = classify_position(EnclosureType::VikingIosxp, 21, 5);
        assert_eq!(c, ConnectorClass { range: ConnectorRange::InternalRange1, conn_id: 3 });
        let c = classify_position(EnclosureType::VikingIosxp, 43, 5);
        assert_eq!(c, ConnectorClass { range: ConnectorRange::Range0, conn_id: 7 });
        assert!(matches!(
            map_position_to_range_conn_id(EnclosureType::VikingIosxp, 44, 5),
            Err(EnclosureStatus::InvalidConnectorPosition(44))
        ));
    }

    #[test]
    fn cayenne_and_naga_windows() {
        assert_eq!(classify_position(EnclosureType::CayenneIosxp, 28, 9).conn_id, 4);
        assert_eq!(classify_position(EnclosureType::CayenneIosxp, 29, 9).range, ConnectorRange::Illegal);
        let c = classify_position(EnclosureType::NagaIosxp, 29, 9);
        assert_eq!(c, ConnectorClass { range: ConnectorRange::InternalRange1, conn_id: 5 });
        assert_eq!(classify_position(EnclosureType::NagaIosxp, 15, 9).conn_id, 3);
    }

    #[test]
    fn every_position_lands_in_exactly_one_range() {
        for encl in EnclosureType::ALL {
            let m = u32::from(encl.capabilities().max_port_conn);
            for p in 0..(m * 6).max(50) {
                let class = classify_position(encl, p, m);
                let ok = map_position_to_range_conn_id(encl, p, m).is_ok();
                assert_eq!(ok, class.range != ConnectorRange::Illegal);
            }
        }
    }
}
