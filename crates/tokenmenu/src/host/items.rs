use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Weapon,
    Power,
    Other,
}

impl ItemKind {
    pub(crate) fn sort_rank(self) -> u8 {
        match self {
            Self::Weapon => 0,
            Self::Power => 1,
            Self::Other => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EquipStatus {
    TwoHands,
    MainHand,
    OffHand,
    #[default]
    Carried,
    Stored,
}

impl EquipStatus {
    pub(crate) fn sort_rank(self) -> u8 {
        match self {
            Self::TwoHands => 0,
            Self::MainHand => 1,
            Self::OffHand => 2,
            Self::Carried => 3,
            Self::Stored => 4,
        }
    }

    pub fn localization_key(self) -> &'static str {
        match self {
            Self::TwoHands => "TOKENMENU.Equip.TwoHands",
            Self::MainHand => "TOKENMENU.Equip.MainHand",
            Self::OffHand => "TOKENMENU.Equip.OffHand",
            Self::Carried => "TOKENMENU.Equip.Carried",
            Self::Stored => "TOKENMENU.Equip.Stored",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeaponGroup {
    Melee,
    Ranged,
    Thrown,
    #[default]
    Natural,
}

impl WeaponGroup {
    pub(crate) fn sort_rank(self) -> u8 {
        match self {
            Self::Melee => 0,
            Self::Ranged => 1,
            Self::Thrown => 2,
            Self::Natural => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ammo {
    pub current: u32,
    pub max: u32,
}

/// Projection of a host item into what the menus display and sort on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: ItemId,
    pub name: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub equip_status: EquipStatus,
    #[serde(default)]
    pub group: WeaponGroup,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub ammo: Option<Ammo>,
    #[serde(default)]
    pub damage: Option<String>,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub ap: i32,
    #[serde(default)]
    pub trait_mod: i32,
    #[serde(default)]
    pub power_points: Option<u32>,
}

impl MenuItem {
    pub fn new(id: &str, name: &str, kind: ItemKind) -> Self {
        Self {
            id: ItemId::from(id),
            name: name.to_string(),
            kind,
            img: String::new(),
            equip_status: EquipStatus::default(),
            group: WeaponGroup::default(),
            favorite: false,
            ammo: None,
            damage: None,
            range: None,
            ap: 0,
            trait_mod: 0,
            power_points: None,
        }
    }

    pub fn is_weapon(&self) -> bool {
        self.kind == ItemKind::Weapon
    }
}
