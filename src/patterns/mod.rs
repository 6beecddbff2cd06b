//! Weapon parameter and recoil pattern tables

pub mod profile;
pub mod store;

pub use profile::{RecoilStep, WeaponParams, WeaponProfile};
pub use store::{LoadError, PatternStore, WeaponsDocument};
