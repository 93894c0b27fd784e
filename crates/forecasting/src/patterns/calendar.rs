//! Event catalogue and occurrence resolution.
//!
//! Lunar holidays are approximated with a year-keyed lookup table; years
//! missing from the table fall back to a fixed month/day.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::patterns::types::BusinessType;

/// Anchor dates that move with the Islamic or Chinese lunar calendars.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LunarAnchor {
    RamadanStart,
    EidAlFitr,
    EidAlAdha,
    ChineseNewYear,
}

impl LunarAnchor {
    fn table(&self) -> &'static [(i32, u32, u32)] {
        match self {
            LunarAnchor::RamadanStart => &[
                (2019, 5, 6),
                (2020, 4, 24),
                (2021, 4, 13),
                (2022, 4, 3),
                (2023, 3, 23),
                (2024, 3, 12),
                (2025, 3, 1),
                (2026, 2, 18),
                (2027, 2, 8),
                (2028, 1, 28),
                (2029, 1, 16),
                (2030, 1, 6),
            ],
            LunarAnchor::EidAlFitr => &[
                (2019, 6, 5),
                (2020, 5, 24),
                (2021, 5, 13),
                (2022, 5, 2),
                (2023, 4, 22),
                (2024, 4, 10),
                (2025, 3, 31),
                (2026, 3, 20),
                (2027, 3, 10),
                (2028, 2, 27),
                (2029, 2, 14),
                (2030, 2, 4),
            ],
            LunarAnchor::EidAlAdha => &[
                (2019, 8, 11),
                (2020, 7, 31),
                (2021, 7, 20),
                (2022, 7, 10),
                (2023, 6, 29),
                (2024, 6, 17),
                (2025, 6, 7),
                (2026, 5, 27),
                (2027, 5, 17),
                (2028, 5, 5),
                (2029, 4, 24),
                (2030, 4, 13),
            ],
            LunarAnchor::ChineseNewYear => &[
                (2019, 2, 5),
                (2020, 1, 25),
                (2021, 2, 12),
                (2022, 2, 1),
                (2023, 1, 22),
                (2024, 2, 10),
                (2025, 1, 29),
                (2026, 2, 17),
                (2027, 2, 6),
                (2028, 1, 26),
                (2029, 2, 13),
                (2030, 2, 3),
            ],
        }
    }

    fn fallback(&self) -> (u32, u32) {
        match self {
            LunarAnchor::RamadanStart => (3, 10),
            LunarAnchor::EidAlFitr => (4, 10),
            LunarAnchor::EidAlAdha => (6, 17),
            LunarAnchor::ChineseNewYear => (2, 1),
        }
    }

    /// Anchor date for `year`, falling back to a fixed date when the table has no entry.
    pub fn date_in(&self, year: i32) -> Option<NaiveDate> {
        let (month, day) = self
            .table()
            .iter()
            .find(|(y, _, _)| *y == year)
            .map(|(_, m, d)| (*m, *d))
            .unwrap_or_else(|| self.fallback());
        NaiveDate::from_ymd_opt(year, month, day)
    }

    pub fn is_tabulated(&self, year: i32) -> bool {
        self.table().iter().any(|(y, _, _)| *y == year)
    }
}

/// How an event's start date is determined each year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum EventDateRule {
    Fixed { month: u32, day: u32 },
    Lunar { anchor: LunarAnchor, offset_days: i64 },
    /// Dates computed by an external calendar service.
    Explicit { dates: Vec<NaiveDate> },
}

impl EventDateRule {
    pub fn start_in(&self, year: i32) -> Vec<NaiveDate> {
        match self {
            EventDateRule::Fixed { month, day } => {
                NaiveDate::from_ymd_opt(year, *month, *day).into_iter().collect()
            }
            EventDateRule::Lunar { anchor, offset_days } => anchor
                .date_in(year)
                .and_then(|d| shift(d, *offset_days))
                .into_iter()
                .collect(),
            EventDateRule::Explicit { dates } => {
                dates.iter().copied().filter(|d| d.year() == year).collect()
            }
        }
    }
}

/// A catalogued calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub name: String,
    pub rule: EventDateRule,
    pub duration_days: u32,
    /// Category slugs whose demand is analysed separately.
    pub affected_categories: Vec<String>,
    /// Empty means every business type.
    pub business_types: Vec<BusinessType>,
    /// Empty means every region.
    pub regions: Vec<String>,
    /// Handled by the specialized learner during lookups.
    pub delegated: bool,
}

impl CalendarEvent {
    pub fn new(name: impl Into<String>, rule: EventDateRule, duration_days: u32) -> Self {
        Self {
            name: name.into(),
            rule,
            duration_days: duration_days.max(1),
            affected_categories: Vec::new(),
            business_types: Vec::new(),
            regions: Vec::new(),
            delegated: false,
        }
    }

    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.affected_categories = categories.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn for_business_types(mut self, types: &[BusinessType]) -> Self {
        self.business_types = types.to_vec();
        self
    }

    pub fn for_regions(mut self, regions: &[&str]) -> Self {
        self.regions = regions.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn delegated(mut self) -> Self {
        self.delegated = true;
        self
    }

    pub fn applies_to(&self, business_type: BusinessType, region: Option<&str>) -> bool {
        let business_ok = self.business_types.is_empty() || self.business_types.contains(&business_type);
        let region_ok = self.regions.is_empty()
            || region.is_some_and(|r| self.regions.iter().any(|x| x.eq_ignore_ascii_case(r)));
        business_ok && region_ok
    }

    /// Windows of every occurrence starting in `first_year..=last_year`.
    pub fn occurrences(&self, first_year: i32, last_year: i32, pre_days: i64, post_days: i64) -> Vec<EventWindows> {
        (first_year..=last_year)
            .flat_map(|y| self.rule.start_in(y))
            .filter_map(|start| EventWindows::new(start, self.duration_days, pre_days, post_days))
            .collect()
    }
}

/// Inclusive date range.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// The four disjoint analysis windows of one occurrence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindows {
    /// Event window shifted one calendar year back.
    pub baseline: DateWindow,
    pub pre: DateWindow,
    pub event: DateWindow,
    pub post: DateWindow,
}

impl EventWindows {
    pub fn new(start: NaiveDate, duration_days: u32, pre_days: i64, post_days: i64) -> Option<Self> {
        let end = shift(start, duration_days.max(1) as i64 - 1)?;
        let event = DateWindow { start, end };
        let pre = DateWindow {
            start: shift(start, -pre_days)?,
            end: shift(start, -1)?,
        };
        let post = DateWindow {
            start: shift(end, 1)?,
            end: shift(end, post_days)?,
        };
        let baseline = DateWindow {
            start: start.checked_sub_months(Months::new(12))?,
            end: end.checked_sub_months(Months::new(12))?,
        };
        Some(Self {
            baseline,
            pre,
            event,
            post,
        })
    }

    /// First day covered by any window except the baseline.
    pub fn span_start(&self) -> NaiveDate {
        self.pre.start
    }

    pub fn span_end(&self) -> NaiveDate {
        self.post.end
    }
}

/// Catalogue of events known to the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCatalogue {
    events: Vec<CalendarEvent>,
}

impl EventCatalogue {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn get(&self, name: &str) -> Option<&CalendarEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Default Indonesian retail calendar.
    pub fn indonesian_retail() -> Self {
        use BusinessType::*;

        Self::new(vec![
            CalendarEvent::new(
                "ramadan",
                EventDateRule::Lunar { anchor: LunarAnchor::RamadanStart, offset_days: 0 },
                30,
            )
            .with_categories(&["food_beverages", "fashion", "household"])
            .delegated(),
            CalendarEvent::new(
                "lebaran",
                EventDateRule::Lunar { anchor: LunarAnchor::EidAlFitr, offset_days: -1 },
                7,
            )
            .with_categories(&["food_beverages", "fashion", "gifts"])
            .delegated(),
            CalendarEvent::new(
                "idul_adha",
                EventDateRule::Lunar { anchor: LunarAnchor::EidAlAdha, offset_days: 0 },
                3,
            )
            .with_categories(&["food_beverages"])
            .for_business_types(&[Grocery, Restaurant, General]),
            CalendarEvent::new(
                "chinese_new_year",
                EventDateRule::Lunar { anchor: LunarAnchor::ChineseNewYear, offset_days: 0 },
                3,
            )
            .with_categories(&["food_beverages", "gifts", "fashion"]),
            CalendarEvent::new("christmas", EventDateRule::Fixed { month: 12, day: 24 }, 3)
                .with_categories(&["gifts", "food_beverages", "electronics"]),
            CalendarEvent::new("new_year", EventDateRule::Fixed { month: 12, day: 31 }, 2)
                .with_categories(&["food_beverages"]),
            CalendarEvent::new("independence_day", EventDateRule::Fixed { month: 8, day: 17 }, 1)
                .with_categories(&["household", "food_beverages"]),
            CalendarEvent::new("back_to_school", EventDateRule::Fixed { month: 7, day: 1 }, 21)
                .with_categories(&["stationery", "fashion", "electronics"])
                .for_business_types(&[Fashion, Electronics, General, Stationery]),
            CalendarEvent::new("harbolnas", EventDateRule::Fixed { month: 12, day: 12 }, 1)
                .with_categories(&["electronics", "fashion"])
                .for_business_types(&[Fashion, Electronics, General]),
            CalendarEvent::new("nyepi", EventDateRule::Fixed { month: 3, day: 11 }, 1)
                .with_categories(&["food_beverages"])
                .for_regions(&["bali"]),
        ])
    }
}

impl Default for EventCatalogue {
    fn default() -> Self {
        Self::indonesian_retail()
    }
}

fn shift(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days as u64))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn lunar_table_and_fallback() {
        assert_eq!(LunarAnchor::EidAlFitr.date_in(2024), Some(d(2024, 4, 10)));
        assert!(!LunarAnchor::EidAlFitr.is_tabulated(2040));
        assert_eq!(LunarAnchor::EidAlFitr.date_in(2040), Some(d(2040, 4, 10)));
    }

    #[test]
    fn windows_are_disjoint_and_sized() {
        let w = EventWindows::new(d(2024, 4, 9), 7, 14, 7).unwrap();
        assert_eq!(w.event.days(), 7);
        assert_eq!(w.pre.days(), 14);
        assert_eq!(w.post.days(), 7);
        assert_eq!(w.pre.end.succ_opt(), Some(w.event.start));
        assert_eq!(w.event.end.succ_opt(), Some(w.post.start));
        assert_eq!(w.baseline.start, d(2023, 4, 9));
        assert_eq!(w.baseline.end, d(2023, 4, 15));
    }

    #[test]
    fn leap_day_baseline_clamps_to_feb_28() {
        let w = EventWindows::new(d(2024, 2, 29), 1, 14, 7).unwrap();
        assert_eq!(w.baseline.start, d(2023, 2, 28));
    }

    #[test]
    fn lunar_offset_shifts_start() {
        let ev = EventCatalogue::indonesian_retail();
        let lebaran = ev.get("lebaran").unwrap();
        let occ = lebaran.occurrences(2024, 2024, 14, 7);
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].event.start, d(2024, 4, 9));
    }

    #[test]
    fn explicit_dates_filter_by_year() {
        let rule = EventDateRule::Explicit { dates: vec![d(2023, 5, 1), d(2024, 5, 3)] };
        assert_eq!(rule.start_in(2024), vec![d(2024, 5, 3)]);
    }

    #[test]
    fn regional_events_require_matching_region() {
        let cat = EventCatalogue::indonesian_retail();
        let nyepi = cat.get("nyepi").unwrap();
        assert!(nyepi.applies_to(BusinessType::Grocery, Some("Bali")));
        assert!(!nyepi.applies_to(BusinessType::Grocery, Some("jakarta")));
        assert!(!nyepi.applies_to(BusinessType::Grocery, None));
    }
}
