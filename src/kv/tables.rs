//! Column family names (spec §3). Every table is opened as a raw
//! `Bytes -> Bytes` LMDB sub-database; the codec layer (§4.1) is entirely
//! responsible for what the bytes mean in each one.

pub const REDIRECT: &str = "redirect";
pub const REDIRECT_OF: &str = "redirect_of";
pub const LABEL: &str = "label";
pub const LABELS: &str = "labels";
pub const DESCRIPTIONS: &str = "descriptions";
pub const ALIASES: &str = "aliases";
pub const SITELINKS: &str = "sitelinks";
pub const CLAIMS: &str = "claims";
pub const CLAIM_ENT_INV: &str = "claim_ent_inv";

/// All nine column families, in the order `Engine::open` creates them.
pub const ALL: &[&str] = &[
    REDIRECT,
    REDIRECT_OF,
    LABEL,
    LABELS,
    DESCRIPTIONS,
    ALIASES,
    SITELINKS,
    CLAIMS,
    CLAIM_ENT_INV,
];
