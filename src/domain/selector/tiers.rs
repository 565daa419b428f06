use lazy_static::lazy_static;

use crate::domain::datetime::time_format;
use crate::error::Result;

/// Selector categories the fallback engine knows about. Each category owns
/// an ordered list of tiers; tier 1 is the most specific and most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorCategory {
    Calendar,
    Court,
    Slot,
    FreeSlot,
    Login,
    Checkout,
    SpecificSlot,
}

impl SelectorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorCategory::Calendar => "calendar",
            SelectorCategory::Court => "court",
            SelectorCategory::Slot => "slot",
            SelectorCategory::FreeSlot => "free-slot",
            SelectorCategory::Login => "login",
            SelectorCategory::Checkout => "checkout",
            SelectorCategory::SpecificSlot => "specific-slot",
        }
    }
}

impl std::fmt::Display for SelectorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SelectorTier {
    pub priority: u8,
    pub description: &'static str,
    pub selectors: Vec<String>,
    pub timeout_ms: u64,
}

impl SelectorTier {
    fn new(priority: u8, description: &'static str, selectors: &[&str], timeout_ms: u64) -> SelectorTier {
        SelectorTier { priority, description, selectors: selectors.iter().map(|s| s.to_string()).collect(), timeout_ms }
    }
}

lazy_static! {
    static ref CALENDAR_TIERS: Vec<SelectorTier> = vec![
        SelectorTier::new(1, "verified calendar container", &["#booking-calendar-container", "xpath=//div[@id='booking-calendar-container']"], 10_000),
        SelectorTier::new(2, "generic calendar fallbacks", &[".calendar", "[data-testid=\"calendar\"]"], 5_000),
    ];
    static ref COURT_TIERS: Vec<SelectorTier> = vec![
        SelectorTier::new(1, "court cells by data attribute", &["td[data-court]"], 5_000),
        SelectorTier::new(2, "court cells scoped to the calendar container", &["xpath=//div[@id='booking-calendar-container']//td[@data-court]"], 5_000),
    ];
    static ref SLOT_TIERS: Vec<SelectorTier> = vec![
        SelectorTier::new(1, "full slot attribute quadruple", &["td[data-date][data-start][data-state][data-court]"], 5_000),
        SelectorTier::new(2, "partial slot attributes", &["td[data-date]", "td[data-start]"], 5_000),
    ];
    static ref FREE_SLOT_TIERS: Vec<SelectorTier> = vec![
        SelectorTier::new(1, "free cells by state attribute", &["td[data-state=\"free\"]"], 5_000),
        SelectorTier::new(2, "free cells by class", &["td.slot-free", "td[data-bookable='true']"], 5_000),
    ];
    static ref LOGIN_TIERS: Vec<SelectorTier> = vec![
        SelectorTier::new(1, "login form", &["[data-testid=\"login-form\"]", "form.login"], 8_000),
        SelectorTier::new(2, "login inputs", &["input[type='email']", "#email"], 5_000),
    ];
    static ref CHECKOUT_TIERS: Vec<SelectorTier> = vec![
        SelectorTier::new(1, "checkout action", &["[data-testid=\"checkout\"]", "button.checkout"], 8_000),
        SelectorTier::new(2, "generic submit", &["#checkout", "button[type='submit']"], 5_000),
    ];
}

/// Static tiers for every category except [`SelectorCategory::SpecificSlot`],
/// whose selectors are built per slot with [`specific_slot_tiers`].
pub fn tiers_for(category: SelectorCategory) -> &'static [SelectorTier] {
    match category {
        SelectorCategory::Calendar => &CALENDAR_TIERS,
        SelectorCategory::Court => &COURT_TIERS,
        SelectorCategory::Slot => &SLOT_TIERS,
        SelectorCategory::FreeSlot => &FREE_SLOT_TIERS,
        SelectorCategory::Login => &LOGIN_TIERS,
        SelectorCategory::Checkout => &CHECKOUT_TIERS,
        SelectorCategory::SpecificSlot => &[],
    }
}

/// Tiers targeting one concrete slot cell. `time` accepts either `HH:MM`
/// or the calendar's compact `HHMM` notation.
pub fn specific_slot_tiers(date: &str, time: &str, court: &str) -> Result<Vec<SelectorTier>> {
    let compact = time_format::to_compact(&time_format::to_colon(time)?)?;

    let exact = format!("td[data-date='{}'][data-start='{}'][data-court='{}'][data-state='free']", date, compact, court);
    let without_state = format!("td[data-date='{}'][data-start='{}'][data-court='{}']", date, compact, court);

    Ok(vec![
        SelectorTier { priority: 1, description: "exact free slot cell", selectors: vec![exact], timeout_ms: 5_000 },
        SelectorTier { priority: 2, description: "slot cell regardless of state", selectors: vec![without_state], timeout_ms: 3_000 },
    ])
}

/// Cache key suffix identifying one specific slot within its category.
pub fn specific_slot_id(date: &str, time: &str, court: &str) -> Result<String> {
    let compact = time_format::to_compact(&time_format::to_colon(time)?)?;
    Ok(format!("{}-{}-{}", date, compact, court))
}
