/// Right shift applied to senone scores and transition costs.
/// Search-level scores are all expressed in these shifted units.
pub const SENSCR_SHIFT: u32 = 10;

/// The worst representable search score. Large enough to survive a few
/// additions of negative transition and acoustic costs without wrapping.
pub const WORST_SCORE: i32 = -536_870_912; // 0xE0000000

/// Quantized transition cost meaning "this transition is not allowed".
pub const TMAT_DISALLOWED: u8 = 255;

/// `hmm_tprob` of a disallowed transition.
pub const TMAT_WORST_SCORE: i32 = -(TMAT_DISALLOWED as i32);

/// Ceiling for quantized mixture weight costs.
pub const MAX_NEG_MIXW: i32 = 159;

/// Ceiling for normalized top-N density costs (`MAX_NEG_MIXW + MAX_NEG_ASCR`
/// still fits the 8-bit log-add table index range).
pub const MAX_NEG_ASCR: i32 = 96;

/// Byte-order marker written after the ASCII header of binary model files.
pub const BYTE_ORDER_MAGIC: u32 = 0x1122_3344;

/// Parameter version expected in transition, Gaussian and mixture files.
pub const MODEL_PARAM_VERSION: &str = "1.0";
