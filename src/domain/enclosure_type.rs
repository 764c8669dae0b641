/// Static enclosure capability table
///
/// One immutable entry per simulated SAS enclosure family. Slot to phy
/// layouts differ between the two SP sides, so each entry carries both.
use crate::domain::eses::SpSide;
use crate::error::{EnclosureStatus, Result};
use std::fmt;

/// Upper bound on drive slots any enclosure exposes through ESES.
pub const MAX_DRIVE_SLOTS: usize = 120;

/// Upper bound on connector ids any enclosure reports.
pub const MAX_CONNECTOR_ID_COUNT: u8 = 8;

/// Marker used by the lane maps for an unwired lane.
pub const UNMAPPED_PHY: u8 = 255;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnclosureType {
    Bullet,
    Viper,
    Pinecone,
    Magnum,
    Bunker,
    Citadel,
    Derringer,
    VoyagerIcm,
    VoyagerEe,
    Fallback,
    Boxwood,
    Knot,
    Steeljaw,
    Ramhorn,
    Ancho,
    VikingIosxp,
    VikingDrvsxp,
    CayenneIosxp,
    CayenneDrvsxp,
    NagaIosxp,
    NagaDrvsxp,
    Rhea,
    Miranda,
    Calypso,
    Tabasco,
}

#[derive(Debug)]
pub struct EnclosureCapabilities {
    pub max_drive_slots: u8,
    pub max_phys: u8,
    pub max_encl_conn: u8,
    pub max_lcc_conn: u8,
    pub max_port_conn: u8,
    pub max_single_lane_port_conn: u8,
    pub max_ps: u8,
    pub max_cooling: u8,
    pub max_temp_sensor: u8,
    pub max_display_chars: u8,
    pub max_lccs: u8,
    pub max_ee_lccs: u8,
    pub max_ext_cooling: u8,
    pub max_bem_cooling: u8,
    pub max_conn_id_count: u8,
    slot_to_phy_a: &'static [u8],
    slot_to_phy_b: &'static [u8],
    conn_to_phy: &'static [&'static [u8]],  // [connector id][lane], SP A wiring
    conn_start_slot: &'static [u8],         // connector id -> first global slot
}

const STD_CONNS: &[&[u8]] = &[&[0, 1, 2, 3], &[4, 5, 6, 7]];
const SWAPPED_CONNS: &[&[u8]] = &[&[4, 5, 6, 7], &[0, 1, 2, 3]];
const LINEAR_25: &[u8] = &[
    8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
];
const DERRINGER_25: &[u8] = &[
    11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35,
];
// Flat initializer on the Bullet row spills its trailing counts into the map.
const BULLET_MAP: &[u8] = &[0, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0];
const NAGA_DRVSXP_MAP: &[u8] = &[
    62, 56, 50, 44, 38, 32, 26, 20, 14, 8, 63, 57, 51, 45, 39, 33, 27, 21, 15, 9, 64, 58, 52, 46,
    40, 34, 28, 22, 16, 10, 65, 59, 53, 47, 41, 35, 29, 23, 17, 11, 66, 60, 54, 48, 42, 36, 30, 24,
    18, 12, 67, 61, 55, 49, 43, 37, 31, 25, 19, 13,
];
const CAYENNE_DRVSXP_MAP: &[u8] = &[
    46, 47, 42, 43, 38, 39, 32, 33, 26, 27, 22, 23, 66, 67, 62, 63, 58, 59, 14, 15, 10, 11, 6, 7,
    54, 55, 50, 40, 41, 34, 35, 28, 29, 51, 18, 19, 64, 60, 56, 52, 48, 44, 24, 20, 16, 12, 8, 4,
    65, 61, 57, 53, 49, 45, 25, 21, 17, 13, 9, 5,
];

macro_rules! caps {
    (
        $slots:expr, $phys:expr, $encl:expr, $lcc:expr, $port:expr, $lane:expr,
        $ps:expr, $cool:expr, $temp:expr;
        $disp:expr, $lccs:expr, $ee:expr, $ext:expr, $bem:expr, $conn_ids:expr;
        a = $a:expr, b = $b:expr, conns = $conns:expr, start = $start:expr
    ) => {
        EnclosureCapabilities {
            max_drive_slots: $slots,
            max_phys: $phys,
            max_encl_conn: $encl,
            max_lcc_conn: $lcc,
            max_port_conn: $port,
            max_single_lane_port_conn: $lane,
            max_ps: $ps,
            max_cooling: $cool,
            max_temp_sensor: $temp,
            max_display_chars: $disp,
            max_lccs: $lccs,
            max_ee_lccs: $ee,
            max_ext_cooling: $ext,
            max_bem_cooling: $bem,
            max_conn_id_count: $conn_ids,
            slot_to_phy_a: $a,
            slot_to_phy_b: $b,
            conn_to_phy: $conns,
            conn_start_slot: $start,
        }
    };
}

static BULLET: EnclosureCapabilities = caps!(15, 36, 20, 10, 5, 4, 2, 4, 1; 0, 0, 0, 0, 0, 0;
    a = BULLET_MAP, b = BULLET_MAP, conns = &[], start = &[]);
static VIPER: EnclosureCapabilities = caps!(15, 36, 20, 10, 5, 4, 2, 4, 1; 3, 2, 0, 0, 0, 2;
    a = &[20, 22, 23, 21, 19, 18, 17, 16, 15, 14, 13, 12, 11, 10, 9],
    b = &[9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 21, 23, 22, 20],
    conns = SWAPPED_CONNS, start = &[]);
static PINECONE: EnclosureCapabilities = caps!(12, 24, 20, 10, 5, 4, 2, 4, 0; 3, 2, 0, 0, 0, 2;
    a = &[19, 20, 21, 22, 15, 18, 23, 16, 17, 14, 13, 12],
    b = &[12, 13, 14, 17, 16, 23, 18, 15, 22, 21, 20, 19],
    conns = STD_CONNS, start = &[]);
static MAGNUM: EnclosureCapabilities = caps!(15, 24, 10, 5, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = &[4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18],
    b = &[4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18],
    conns = &[&[0, 1, 2, 3], &[UNMAPPED_PHY; 4]], start = &[]);
static BUNKER: EnclosureCapabilities = caps!(15, 36, 20, 10, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = &[12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26],
    b = &[12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26],
    conns = &[&[1, 0, 2, 3], &[4, 5, 6, 7]], start = &[]);
static CITADEL: EnclosureCapabilities = caps!(25, 36, 20, 10, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = LINEAR_25, b = LINEAR_25, conns = STD_CONNS, start = &[]);
static DERRINGER: EnclosureCapabilities = caps!(25, 36, 20, 10, 5, 4, 2, 4, 1; 3, 2, 0, 0, 0, 2;
    a = DERRINGER_25, b = DERRINGER_25, conns = SWAPPED_CONNS, start = &[]);
static VOYAGER_ICM: EnclosureCapabilities = caps!(0, 24, 60, 30, 5, 4, 2, 7, 1; 3, 4, 2, 3, 0, 6;
    a = &[], b = &[],
    conns = &[
        &[20, 21, 22, 23],
        &[12, 13, 14, 15],
        &[16, 17, 18, 19],
        &[8, 9, 10, 11],
        &[0, 1, 2, 7],
        &[3, 4, 5, 6],
    ],
    start = &[0, 0, 0, 0, 0, 30]);
static VOYAGER_EE: EnclosureCapabilities = caps!(30, 36, 10, 5, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 1;
    a = &[
        6, 1, 2, 5, 9, 8, 3, 7, 15, 18, 22, 27, 0, 4, 12, 20, 23, 28, 11, 10, 13, 19, 24, 30, 14,
        16, 17, 21, 26, 25,
    ],
    b = &[
        12, 11, 10, 5, 0, 6, 20, 17, 14, 7, 2, 3, 19, 18, 9, 8, 4, 1, 23, 22, 21, 13, 15, 16, 27,
        28, 24, 26, 25, 30,
    ],
    conns = &[&[31, 32, 33, 34]], start = &[]);
static FALLBACK: EnclosureCapabilities = caps!(25, 36, 20, 10, 5, 4, 0, 3, 1; 0, 2, 0, 0, 3, 2;
    a = &[
        32, 31, 29, 25, 22, 18, 17, 19, 20, 21, 23, 24, 26, 27, 28, 30, 16, 15, 14, 13, 12, 11,
        10, 9, 8,
    ],
    b = &[
        32, 31, 30, 29, 28, 27, 26, 25, 16, 17, 19, 20, 22, 23, 24, 21, 18, 15, 14, 13, 12, 11,
        10, 9, 8,
    ],
    conns = STD_CONNS, start = &[]);
static BOXWOOD: EnclosureCapabilities = caps!(12, 36, 20, 10, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = &[15, 16, 17, 18, 11, 14, 19, 12, 13, 10, 9, 8],
    b = &[15, 16, 17, 18, 11, 14, 19, 12, 13, 10, 9, 8],
    conns = STD_CONNS, start = &[]);
static KNOT: EnclosureCapabilities = caps!(25, 36, 20, 10, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = LINEAR_25, b = LINEAR_25, conns = STD_CONNS, start = &[]);
static STEELJAW: EnclosureCapabilities = caps!(12, 36, 20, 10, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = &[19, 18, 17, 16, 15, 14, 13, 12, 11, 10, 9, 8],
    b = &[19, 18, 17, 16, 15, 14, 13, 12, 11, 10, 9, 8],
    conns = STD_CONNS, start = &[]);
static RAMHORN: EnclosureCapabilities = caps!(25, 36, 20, 10, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = LINEAR_25, b = LINEAR_25, conns = STD_CONNS, start = &[]);
static ANCHO: EnclosureCapabilities = caps!(15, 36, 20, 10, 5, 4, 2, 4, 1; 3, 2, 0, 0, 0, 2;
    a = &[23, 22, 21, 20, 19, 18, 17, 16, 15, 14, 13, 12, 11, 10, 5],
    b = &[5, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23],
    conns = &[&[0, 1, 2, 3], &[6, 7, 8, 9]], start = &[]);
static VIKING_IOSXP: EnclosureCapabilities = caps!(0, 36, 88, 44, 6, 5, 4, 10, 2; 3, 2, 1, 10, 0, MAX_CONNECTOR_ID_COUNT;
    a = &[], b = &[],
    conns = &[
        &[3, 2, 1, 0],
        &[7, 6, 5, 4],
        &[8, 9, 10, 11, 12],
        &[13, 14, 15, 16, 17],
        &[18, 19, 20, 21, 22],
        &[23, 24, 25, 26, 27],
        &[31, 30, 29, 28],
        &[35, 34, 33, 32],
    ],
    start = &[0, 0, 0, 30, 60, 90, 0, 0]);
static VIKING_DRVSXP: EnclosureCapabilities = caps!(30, 36, 12, 6, 6, 5, 0, 0, 0; 0, 2, 0, 0, 0, 1;
    a = &[
        12, 14, 16, 18, 20, 13, 15, 17, 19, 21, 7, 9, 11, 23, 25, 6, 8, 10, 22, 24, 1, 3, 5, 27,
        29, 0, 2, 4, 26, 28,
    ],
    b = &[
        12, 14, 16, 18, 20, 13, 15, 17, 19, 21, 11, 22, 23, 25, 27, 9, 10, 24, 26, 28, 7, 8, 29,
        31, 33, 5, 6, 30, 32, 34,
    ],
    conns = &[&[31, 32, 33, 34, 35]], start = &[]);
static CAYENNE_IOSXP: EnclosureCapabilities = caps!(0, 24, 56, 28, 9, 8, 2, 10, 1; 3, 2, 1, 3, 0, MAX_CONNECTOR_ID_COUNT;
    a = &[], b = &[],
    conns = &[
        &[2, 3, 1, 0],
        &[6, 7, 5, 4],
        &[10, 11, 9, 8],
        &[22, 23, 21, 20],
        &[12, 13, 14, 15, 16, 17, 18, 19],
        &[0, 0, 0, 0],
    ],
    start = &[0, 0, 0, 0, 0, 0, 0, 0]);
static CAYENNE_DRVSXP: EnclosureCapabilities = caps!(60, 68, 16, 8, 8, 8, 0, 0, 0; 0, 2, 0, 0, 0, 1;
    a = CAYENNE_DRVSXP_MAP, b = CAYENNE_DRVSXP_MAP,
    conns = &[&[3, 2, 1, 0, 30, 31, 36, 37]], start = &[]);
static NAGA_IOSXP: EnclosureCapabilities = caps!(0, 68, 76, 38, 9, 8, 4, 10, 2; 3, 2, 1, 10, 0, 6;
    a = &[], b = &[],
    conns = &[
        &[3, 2, 1, 0],
        &[7, 6, 5, 4],
        &[31, 30, 29, 28],
        &[35, 34, 33, 32],
        &[8, 9, 10, 11, 12, 13, 14, 15],
        &[16, 17, 18, 19, 20, 21, 22, 23],
    ],
    start = &[0, 0, 0, 0, 0, 60]);
static NAGA_DRVSXP: EnclosureCapabilities = caps!(60, 68, 12, 6, 9, 8, 0, 0, 0; 0, 2, 0, 0, 0, 1;
    a = NAGA_DRVSXP_MAP, b = NAGA_DRVSXP_MAP,
    conns = &[&[0, 1, 2, 3, 4, 5, 6, 7]], start = &[]);
static RHEA: EnclosureCapabilities = caps!(12, 36, 20, 10, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = &[15, 2, 5, 32, 0, 3, 6, 31, 1, 4, 7, 30],
    b = &[32, 7, 4, 15, 31, 6, 3, 0, 30, 5, 2, 1],
    conns = &[&[16, 17, 18, 19], &[20, 21, 22, 23]], start = &[]);
static MIRANDA: EnclosureCapabilities = caps!(25, 36, 20, 10, 5, 4, 0, 0, 0; 0, 2, 0, 0, 0, 2;
    a = &[
        8, 9, 10, 11, 12, 13, 14, 15, 0, 1, 2, 3, 4, 5, 6, 7, 24, 25, 26, 27, 28, 29, 30, 31, 32,
    ],
    b = &[
        32, 31, 30, 29, 28, 27, 26, 25, 24, 7, 6, 5, 4, 3, 2, 1, 0, 15, 14, 13, 12, 11, 10, 9, 8,
    ],
    conns = &[&[16, 17, 18, 19], &[20, 21, 22, 23]], start = &[]);
static CALYPSO: EnclosureCapabilities = caps!(25, 36, 20, 10, 5, 4, 0, 6, 4; 0, 2, 0, 0, 0, 2;
    a = LINEAR_25, b = LINEAR_25, conns = STD_CONNS, start = &[]);
static TABASCO: EnclosureCapabilities = caps!(25, 36, 20, 10, 5, 4, 2, 4, 1; 3, 2, 0, 0, 0, 2;
    a = DERRINGER_25, b = DERRINGER_25, conns = STD_CONNS, start = &[]);

impl EnclosureType {
    pub const ALL: [EnclosureType; 25] = [
        EnclosureType::Bullet,
        EnclosureType::Viper,
        EnclosureType::Pinecone,
        EnclosureType::Magnum,
        EnclosureType::Bunker,
        EnclosureType::Citadel,
        EnclosureType::Derringer,
        EnclosureType::VoyagerIcm,
        EnclosureType::VoyagerEe,
        EnclosureType::Fallback,
        EnclosureType::Boxwood,
        EnclosureType::Knot,
        EnclosureType::Steeljaw,
        EnclosureType::Ramhorn,
        EnclosureType::Ancho,
        EnclosureType::VikingIosxp,
        EnclosureType::VikingDrvsxp,
        EnclosureType::CayenneIosxp,
        EnclosureType::CayenneDrvsxp,
        EnclosureType::NagaIosxp,
        EnclosureType::NagaDrvsxp,
        EnclosureType::Rhea,
        EnclosureType::Miranda,
        EnclosureType::Calypso,
        EnclosureType::Tabasco,
    ];

    pub fn capabilities(self) -> &'static EnclosureCapabilities {
        match self {
            EnclosureType::Bullet => &BULLET,
            EnclosureType::Viper => &VIPER,
            EnclosureType::Pinecone => &PINECONE,
            EnclosureType::Magnum => &MAGNUM,
            EnclosureType::Bunker => &BUNKER,
            EnclosureType::Citadel => &CITADEL,
            EnclosureType::Derringer => &DERRINGER,
            EnclosureType::VoyagerIcm => &VOYAGER_ICM,
            EnclosureType::VoyagerEe => &VOYAGER_EE,
            EnclosureType::Fallback => &FALLBACK,
            EnclosureType::Boxwood => &BOXWOOD,
            EnclosureType::Knot => &KNOT,
            EnclosureType::Steeljaw => &STEELJAW,
            EnclosureType::Ramhorn => &RAMHORN,
            EnclosureType::Ancho => &ANCHO,
            EnclosureType::VikingIosxp => &VIKING_IOSXP,
            EnclosureType::VikingDrvsxp => &VIKING_DRVSXP,
            EnclosureType::CayenneIosxp => &CAYENNE_IOSXP,
            EnclosureType::CayenneDrvsxp => &CAYENNE_DRVSXP,
            EnclosureType::NagaIosxp => &NAGA_IOSXP,
            EnclosureType::NagaDrvsxp => &NAGA_DRVSXP,
            EnclosureType::Rhea => &RHEA,
            EnclosureType::Miranda => &MIRANDA,
            EnclosureType::Calypso => &CALYPSO,
            EnclosureType::Tabasco => &TABASCO,
        }
    }

    /// Chassis-level enclosures whose drives live behind edge expanders.
    pub fn has_edge_expanders(self) -> bool {
        matches!(
            self,
            EnclosureType::VoyagerIcm
                | EnclosureType::VikingIosxp
                | EnclosureType::CayenneIosxp
                | EnclosureType::NagaIosxp
        )
    }

    pub fn is_edge_expander(self) -> bool {
        matches!(
            self,
            EnclosureType::VoyagerEe
                | EnclosureType::VikingDrvsxp
                | EnclosureType::CayenneDrvsxp
                | EnclosureType::NagaDrvsxp
        )
    }

    /// Number of drive slots each bank (edge expander) of this chassis owns.
    ///
    /// Equal to `max_drive_slots` for enclosures without edge expanders.
    pub fn slot_count_per_bank(self) -> u8 {
        match self {
            EnclosureType::VoyagerIcm => EnclosureType::VoyagerEe.capabilities().max_drive_slots,
            EnclosureType::VikingIosxp => EnclosureType::VikingDrvsxp.capabilities().max_drive_slots,
            EnclosureType::CayenneIosxp => EnclosureType::CayenneDrvsxp.capabilities().max_drive_slots,
            EnclosureType::NagaIosxp => EnclosureType::NagaDrvsxp.capabilities().max_drive_slots,
            other => other.capabilities().max_drive_slots,
        }
    }

    /// Edge expander type that plugs into this chassis, if any.
    pub fn edge_expander_type(self) -> Option<EnclosureType> {
        match self {
            EnclosureType::VoyagerIcm => Some(EnclosureType::VoyagerEe),
            EnclosureType::VikingIosxp => Some(EnclosureType::VikingDrvsxp),
            EnclosureType::CayenneIosxp => Some(EnclosureType::CayenneDrvsxp),
            EnclosureType::NagaIosxp => Some(EnclosureType::NagaDrvsxp),
            _ => None,
        }
    }

    /// Connector ids that carry a drive bank, in slot order.
    pub fn drive_bank_connectors(self) -> &'static [u8] {
        match self {
            EnclosureType::VoyagerIcm | EnclosureType::NagaIosxp => &[4, 5],
            EnclosureType::VikingIosxp => &[2, 3, 4, 5],
            EnclosureType::CayenneIosxp => &[4],
            _ => &[],
        }
    }

    /// Client-visible slot count, counting every edge expander bank.
    pub fn total_drive_slots(self) -> u32 {
        if self.has_edge_expanders() {
            self.drive_bank_connectors().len() as u32 * u32::from(self.slot_count_per_bank())
        } else {
            u32::from(self.capabilities().max_drive_slots)
        }
    }

    /// PS EEPROMs on these families use the short 336 byte resume layout.
    pub fn has_short_ps_resume(self) -> bool {
        matches!(
            self,
            EnclosureType::VikingIosxp
                | EnclosureType::NagaIosxp
                | EnclosureType::CayenneIosxp
                | EnclosureType::Tabasco
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            EnclosureType::Bullet => "bullet",
            EnclosureType::Viper => "viper",
            EnclosureType::Pinecone => "pinecone",
            EnclosureType::Magnum => "magnum",
            EnclosureType::Bunker => "bunker",
            EnclosureType::Citadel => "citadel",
            EnclosureType::Derringer => "derringer",
            EnclosureType::VoyagerIcm => "voyager-icm",
            EnclosureType::VoyagerEe => "voyager-ee",
            EnclosureType::Fallback => "fallback",
            EnclosureType::Boxwood => "boxwood",
            EnclosureType::Knot => "knot",
            EnclosureType::Steeljaw => "steeljaw",
            EnclosureType::Ramhorn => "ramhorn",
            EnclosureType::Ancho => "ancho",
            EnclosureType::VikingIosxp => "viking-iosxp",
            EnclosureType::VikingDrvsxp => "viking-drvsxp",
            EnclosureType::CayenneIosxp => "cayenne-iosxp",
            EnclosureType::CayenneDrvsxp => "cayenne-drvsxp",
            EnclosureType::NagaIosxp => "naga-iosxp",
            EnclosureType::NagaDrvsxp => "naga-drvsxp",
            EnclosureType::Rhea => "rhea",
            EnclosureType::Miranda => "miranda",
            EnclosureType::Calypso => "calypso",
            EnclosureType::Tabasco => "tabasco",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl fmt::Display for EnclosureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl EnclosureCapabilities {
    fn slot_map(&self, side: SpSide) -> &'static [u8] {
        match side {
            SpSide::A => self.slot_to_phy_a,
            SpSide::B => self.slot_to_phy_b,
        }
    }

    pub fn drive_slot_to_phy(&self, slot: u32, side: SpSide) -> Result<u8> {
        if slot >= u32::from(self.max_drive_slots) {
            return Err(EnclosureStatus::InvalidParameter(format!(
                "drive slot {} beyond {} slots",
                slot, self.max_drive_slots
            )));
        }
        Ok(self.slot_map(side).get(slot as usize).copied().unwrap_or(0))
    }

    /// Reverse lookup: the first slot whose phy is `phy_id`.
    pub fn phy_to_drive_slot(&self, phy_id: u8, side: SpSide) -> Option<u32> {
        (0..u32::from(self.max_drive_slots))
            .find(|&slot| matches!(self.drive_slot_to_phy(slot, side), Ok(p) if p == phy_id))
    }

    pub fn connector_lane_to_phy(&self, conn_id: u8, lane: u8) -> Result<u8> {
        if lane >= self.max_single_lane_port_conn {
            return Err(EnclosureStatus::InvalidParameter(format!(
                "lane {} beyond {} single lane connectors",
                lane, self.max_single_lane_port_conn
            )));
        }
        Ok(self
            .conn_to_phy
            .get(conn_id as usize)
            .and_then(|lanes| lanes.get(lane as usize))
            .copied()
            .unwrap_or(0))
    }

    /// Reverse lookup: the `(lane, connector id)` wired to `phy_id`.
    pub fn phy_to_connector(&self, phy_id: u8) -> Option<(u8, u8)> {
        for lane in 0..self.max_single_lane_port_conn {
            for conn_id in 0..self.max_conn_id_count {
                if matches!(self.connector_lane_to_phy(conn_id, lane), Ok(p) if p == phy_id) {
                    return Some((lane, conn_id));
                }
            }
        }
        None
    }

    pub fn conn_id_to_drive_start_slot(&self, conn_id: u8) -> Result<u32> {
        if conn_id >= self.max_conn_id_count {
            return Err(EnclosureStatus::InvalidParameter(format!(
                "connector id {} beyond {} connector ids",
                conn_id, self.max_conn_id_count
            )));
        }
        Ok(u32::from(
            self.conn_start_slot.get(conn_id as usize).copied().unwrap_or(0),
        ))
    }

    pub fn max_sas_conn_elems(&self) -> u8 {
        self.max_lcc_conn * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_to_phy_is_total_and_within_phy_range() {
        for encl in EnclosureType::ALL {
            let caps = encl.capabilities();
            for side in [SpSide::A, SpSide::B] {
                for slot in 0..u32::from(caps.max_drive_slots) {
                    let phy = caps.drive_slot_to_phy(slot, side).unwrap();
                    assert!(phy < caps.max_phys, "{} slot {} -> phy {}", encl, slot, phy);
                    assert_eq!(phy, caps.drive_slot_to_phy(slot, side).unwrap());
                }
            }
        }
    }

    #[test]
    fn slot_beyond_max_is_rejected() {
        let caps = EnclosureType::Viper.capabilities();
        assert!(caps.drive_slot_to_phy(15, SpSide::A).is_err());
        assert!(EnclosureType::VoyagerIcm
            .capabilities()
            .drive_slot_to_phy(0, SpSide::A)
            .is_err());
    }

    #[test]
    fn viper_sides_use_different_layouts() {
        let caps = EnclosureType::Viper.capabilities();
        assert_eq!(caps.drive_slot_to_phy(3, SpSide::A).unwrap(), 21);
        assert_eq!(caps.drive_slot_to_phy(3, SpSide::B).unwrap(), 12);
        assert_eq!(caps.phy_to_drive_slot(21, SpSide::A), Some(3));
        assert_eq!(caps.phy_to_drive_slot(0, SpSide::A), None);
    }

    #[test]
    fn connector_lanes_and_start_slots() {
        let viking = EnclosureType::VikingIosxp.capabilities();
        assert_eq!(viking.connector_lane_to_phy(2, 4).unwrap(), 12);
        // Short rows are zero padded up to the lane count.
        assert_eq!(viking.connector_lane_to_phy(0, 4).unwrap(), 0);
        assert!(viking.connector_lane_to_phy(0, 5).is_err());
        assert_eq!(viking.conn_id_to_drive_start_slot(5).unwrap(), 90);
        assert!(viking.conn_id_to_drive_start_slot(8).is_err());

        let viper = EnclosureType::Viper.capabilities();
        assert_eq!(viper.phy_to_connector(5), Some((1, 0)));
        assert_eq!(viper.phy_to_connector(20), None);
    }

    #[test]
    fn banks_follow_edge_expander_size() {
        assert_eq!(EnclosureType::VoyagerIcm.slot_count_per_bank(), 30);
        assert_eq!(EnclosureType::NagaIosxp.slot_count_per_bank(), 60);
        assert_eq!(EnclosureType::Viper.slot_count_per_bank(), 15);
        assert_eq!(EnclosureType::from_name("naga-drvsxp"), Some(EnclosureType::NagaDrvsxp));
    }

    #[test]
    fn bank_connectors_cover_client_slots() {
        for encl in EnclosureType::ALL.into_iter().filter(|e| e.has_edge_expanders()) {
            let ee = encl.edge_expander_type().unwrap();
            assert!(ee.is_edge_expander());
            let caps = encl.capabilities();
            let per_bank = u32::from(encl.slot_count_per_bank());
            for (bank, &conn) in encl.drive_bank_connectors().iter().enumerate() {
                assert_eq!(caps.conn_id_to_drive_start_slot(conn).unwrap(), bank as u32 * per_bank);
            }
        }
        assert_eq!(EnclosureType::VikingIosxp.total_drive_slots(), 120);
        assert_eq!(EnclosureType::Viper.total_drive_slots(), 15);
        assert_eq!(EnclosureType::Viper.edge_expander_type(), None);
    }
}
