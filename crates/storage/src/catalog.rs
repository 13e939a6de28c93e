//! School catalog and the price list the add-services step quotes from.

use std::{fmt, str::FromStr};

use serde::Serialize;
use shared::{
    error::FlowError,
    records::{Money, ServiceQuote},
};

pub const SCHOOLS: &[&str] = &["Twalumbu Educational Center"];

pub const YEARS: [u16; 4] = [2023, 2024, 2025, 2026];

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Case-insensitive substring match; a blank query suggests nothing.
pub fn search_schools(query: &str) -> Vec<&'static str> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    SCHOOLS
        .iter()
        .copied()
        .filter(|school| school.to_lowercase().contains(&query))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Term {
    First,
    Second,
    Third,
}

impl Term {
    pub const ALL: [Term; 3] = [Term::First, Term::Second, Term::Third];

    pub fn number(self) -> u8 {
        match self {
            Term::First => 1,
            Term::Second => 2,
            Term::Third => 3,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Term {}", self.number())
    }
}

impl FromStr for Term {
    type Err = FlowError;

    /// Accepts `2` or `Term 2`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let digits = value
            .strip_prefix("Term")
            .or_else(|| value.strip_prefix("term"))
            .unwrap_or(value)
            .trim();
        match digits {
            "1" => Ok(Term::First),
            "2" => Ok(Term::Second),
            "3" => Ok(Term::Third),
            _ => Err(FlowError::validation(format!("unknown term '{value}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BusRoute {
    Woodlands,
    Northmead,
    Longacres,
}

impl BusRoute {
    pub const ALL: [BusRoute; 3] = [BusRoute::Woodlands, BusRoute::Northmead, BusRoute::Longacres];

    pub fn name(self) -> &'static str {
        match self {
            BusRoute::Woodlands => "Woodlands",
            BusRoute::Northmead => "Northmead",
            BusRoute::Longacres => "Longacres",
        }
    }

    pub fn monthly_fee(self) -> Money {
        match self {
            BusRoute::Woodlands => Money::from_kwacha(1500),
            BusRoute::Northmead => Money::from_kwacha(1200),
            BusRoute::Longacres => Money::from_kwacha(1800),
        }
    }
}

impl FromStr for BusRoute {
    type Err = FlowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        BusRoute::ALL
            .into_iter()
            .find(|route| route.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| FlowError::validation(format!("unknown bus route '{value}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CanteenPlan {
    Lunch,
    Breakfast,
    Snacks,
}

impl CanteenPlan {
    pub const ALL: [CanteenPlan; 3] = [
        CanteenPlan::Lunch,
        CanteenPlan::Breakfast,
        CanteenPlan::Snacks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CanteenPlan::Lunch => "Lunch",
            CanteenPlan::Breakfast => "Breakfast",
            CanteenPlan::Snacks => "Snacks",
        }
    }

    pub fn monthly_fee(self) -> Money {
        match self {
            CanteenPlan::Lunch => Money::from_kwacha(1000),
            CanteenPlan::Breakfast => Money::from_kwacha(500),
            CanteenPlan::Snacks => Money::from_kwacha(300),
        }
    }
}

impl FromStr for CanteenPlan {
    type Err = FlowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CanteenPlan::ALL
            .into_iter()
            .find(|plan| plan.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| FlowError::validation(format!("unknown canteen plan '{value}'")))
    }
}

/// Per-term school fees by grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    grade_fees: Vec<(u8, Money)>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

impl FeeSchedule {
    pub fn standard() -> Self {
        Self {
            grade_fees: vec![
                (1, Money::from_kwacha(1200)),
                (2, Money::from_kwacha(1300)),
                (3, Money::from_kwacha(1500)),
                (4, Money::from_kwacha(1600)),
                (5, Money::from_kwacha(1800)),
            ],
        }
    }

    pub fn grades(&self) -> impl Iterator<Item = (u8, Money)> + '_ {
        self.grade_fees.iter().copied()
    }

    pub fn term_fee(&self, grade: u8) -> Option<Money> {
        self.grade_fees
            .iter()
            .find(|(candidate, _)| *candidate == grade)
            .map(|(_, fee)| *fee)
    }

    /// `Grade 3 - Term 1 2025`
    pub fn school_fee(&self, grade: u8, term: Term, year: u16) -> Result<ServiceQuote, FlowError> {
        let amount = self
            .term_fee(grade)
            .ok_or_else(|| FlowError::validation(format!("no fees published for grade {grade}")))?;
        if !YEARS.contains(&year) {
            return Err(FlowError::validation(format!(
                "fees for {year} are not available"
            )));
        }
        Ok(ServiceQuote {
            description: format!("Grade {grade} - {term} {year}"),
            amount,
        })
    }

    /// Bus and/or canteen for one month; at least one must be chosen.
    pub fn other_services(
        &self,
        bus: Option<BusRoute>,
        canteen: Option<CanteenPlan>,
        month: &str,
    ) -> Result<Vec<ServiceQuote>, FlowError> {
        let month = MONTHS
            .iter()
            .copied()
            .find(|candidate| candidate.eq_ignore_ascii_case(month.trim()))
            .ok_or_else(|| FlowError::validation(format!("unknown month '{month}'")))?;

        let mut quotes = Vec::new();
        if let Some(route) = bus {
            quotes.push(ServiceQuote {
                description: format!("School Bus ({}) - {month}", route.name()),
                amount: route.monthly_fee(),
            });
        }
        if let Some(plan) = canteen {
            quotes.push(ServiceQuote {
                description: format!("Canteen ({}) - {month}", plan.name()),
                amount: plan.monthly_fee(),
            });
        }
        if quotes.is_empty() {
            return Err(FlowError::validation("choose a bus route or a canteen plan"));
        }
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_search_is_case_insensitive_substring() {
        assert_eq!(search_schools("twalumbu"), vec!["Twalumbu Educational Center"]);
        assert_eq!(search_schools("  CENTER "), vec!["Twalumbu Educational Center"]);
        assert!(search_schools("Lusaka High").is_empty());
        assert!(search_schools("   ").is_empty());
    }

    #[test]
    fn quotes_school_fees_by_grade_and_term() {
        let schedule = FeeSchedule::standard();
        let quote = schedule
            .school_fee(3, "Term 1".parse().expect("term"), 2025)
            .expect("quote");
        assert_eq!(quote.description, "Grade 3 - Term 1 2025");
        assert_eq!(quote.amount, Money::from_kwacha(1500));

        assert!(schedule.school_fee(9, Term::First, 2025).is_err());
        assert!(schedule.school_fee(3, Term::First, 2031).is_err());
    }

    #[test]
    fn quotes_bus_and_canteen_for_a_month() {
        let quotes = FeeSchedule::standard()
            .other_services(Some(BusRoute::Woodlands), Some(CanteenPlan::Lunch), "march")
            .expect("quotes");
        let described: Vec<(&str, Money)> = quotes
            .iter()
            .map(|quote| (quote.description.as_str(), quote.amount))
            .collect();
        assert_eq!(
            described,
            vec![
                ("School Bus (Woodlands) - March", Money::from_kwacha(1500)),
                ("Canteen (Lunch) - March", Money::from_kwacha(1000)),
            ]
        );
    }

    #[test]
    fn other_services_need_a_choice_and_a_month() {
        let schedule = FeeSchedule::standard();
        assert!(schedule.other_services(None, None, "March").is_err());
        assert!(schedule
            .other_services(None, Some(CanteenPlan::Snacks), "Smarch")
            .is_err());
    }

    #[test]
    fn parses_routes_and_plans() {
        assert_eq!("northmead".parse::<BusRoute>().expect("route"), BusRoute::Northmead);
        assert_eq!("Breakfast".parse::<CanteenPlan>().expect("plan"), CanteenPlan::Breakfast);
        assert!("Term 4".parse::<Term>().is_err());
        assert_eq!("2".parse::<Term>().expect("term"), Term::Second);
    }
}
