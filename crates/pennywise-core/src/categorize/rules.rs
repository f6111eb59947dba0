use std::sync::OnceLock;

use regex::Regex;

use super::{Category, Text};

pub(crate) enum Matcher {
    Keywords {
        keywords: &'static [&'static str],
        exclusions: &'static [&'static str],
    },
    Bill,
}

const fn keywords(keywords: &'static [&'static str]) -> Matcher {
    Matcher::Keywords {
        keywords,
        exclusions: &[],
    }
}

/// Rules in priority order. First match wins.
pub(crate) const PRIORITY: &[(Category, Matcher)] = &[
    (
        Category::Income,
        Matcher::Keywords {
            keywords: INCOME,
            // Rent payments mention "payment"/"reimbursement" but are outgoings.
            // Exclusions match inside words too.
            exclusions: &["rent"],
        },
    ),
    (Category::Healthcare, keywords(HEALTHCARE)),
    (
        Category::Transport,
        Matcher::Keywords {
            keywords: TRANSPORT,
            exclusions: &["uber eats", "bolt food"],
        },
    ),
    (Category::Fuel, keywords(FUEL)),
    (Category::Groceries, keywords(GROCERIES)),
    (Category::Food, keywords(FOOD)),
    (
        Category::Shopping,
        Matcher::Keywords {
            keywords: SHOPPING,
            exclusions: &["amazon prime", "prime video"],
        },
    ),
    (Category::Subscriptions, keywords(SUBSCRIPTIONS)),
    (Category::Entertainment, keywords(ENTERTAINMENT)),
    (Category::Bills, Matcher::Bill),
    (Category::Education, keywords(EDUCATION)),
    (Category::Travel, keywords(TRAVEL)),
];

const INCOME: &[&str] = &[
    "salary", "payroll", "wages", "wage", "income", "refund", "reimbursement", "dividend",
    "interest earned", "bonus", "pension", "cashback", "transfer from", "deposit",
];

const HEALTHCARE: &[&str] = &[
    "pharmacy", "chemist", "doctor", "dentist", "dental", "hospital", "clinic", "medical",
    "optician", "prescription", "physio", "nhs", "gp surgery", "walgreens", "cvs",
];

const TRANSPORT: &[&str] = &[
    "uber", "lyft", "bolt", "taxi", "cab", "train", "trainline", "rail", "tfl", "bus",
    "metro", "subway", "tram", "parking", "toll", "oyster",
];

const FUEL: &[&str] = &[
    "petrol", "fuel", "diesel", "gas station", "shell", "bp", "esso", "texaco", "chevron",
    "exxon",
];

const GROCERIES: &[&str] = &[
    "tesco", "sainsbury", "sainsburys", "asda", "aldi", "lidl", "morrisons", "waitrose",
    "co op", "coop", "ocado", "kroger", "safeway", "whole foods", "trader joe", "grocery",
    "groceries", "supermarket",
];

const FOOD: &[&str] = &[
    "restaurant", "cafe", "coffee", "starbucks", "costa", "pret", "mcdonald", "mcdonalds",
    "kfc", "burger", "pizza", "domino", "dominos", "deliveroo", "just eat", "uber eats",
    "takeaway", "pub", "bakery", "dining", "diner", "greggs", "nandos",
];

const SHOPPING: &[&str] = &[
    "amazon", "ebay", "argos", "ikea", "primark", "zara", "john lewis", "etsy", "currys",
    "asos", "shopping", "shop", "mall", "retail", "clothing",
];

const SUBSCRIPTIONS: &[&str] = &[
    "netflix", "spotify", "disney", "hulu", "prime video", "amazon prime", "apple music",
    "youtube premium", "icloud", "patreon", "subscription", "membership", "adobe", "dropbox",
    "app store", "google play",
];

const ENTERTAINMENT: &[&str] = &[
    "cinema", "odeon", "theatre", "theater", "concert", "ticketmaster", "eventbrite", "steam",
    "playstation", "xbox", "nintendo", "bowling", "museum", "gaming",
];

const EDUCATION: &[&str] = &[
    "school", "tuition", "university", "college", "course", "udemy", "coursera", "textbook",
    "nursery", "tutor", "student",
];

const TRAVEL: &[&str] = &[
    "airline", "airways", "flight", "hotel", "airbnb", "booking com", "expedia", "ryanair",
    "easyjet", "hostel", "holiday", "travel", "car hire", "hertz", "avis",
];

/// Utility, telecom, insurance and housing providers
const BILL_PROVIDERS: &[&str] = &[
    "british gas", "edf", "eon", "e on", "octopus energy", "ovo", "thames water",
    "severn trent", "vodafone", "o2", "ee", "bt", "sky", "virgin media", "talktalk",
    "verizon", "at t", "comcast", "xfinity", "t mobile", "aviva", "admiral", "direct line",
    "axa", "geico", "state farm", "landlord", "letting agent",
];

const BILL_TERMS: &[&str] = &[
    "bill", "utility", "utilities", "electricity", "electric", "water", "gas bill", "energy",
    "broadband", "internet", "phone bill", "insurance", "mortgage", "rent", "council tax",
    "tv licence", "invoice",
];

const PAYMENT_MECHANISMS: &[&str] = &[
    "direct debit", "standing order", "dd", "autopay", "recurring payment",
];

/// Words that turn a dated description into a bill
const DATED_BILL_WORDS: &[&str] = &["payment", "bill", "charge"];

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?x)
            \b(
                \d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}
              | \d{4}[/.-]\d{1,2}[/.-]\d{1,2}
              | \d{1,2}\s?(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*
            )\b",
        )
        .expect("date pattern is valid")
    })
}

pub(crate) fn has_date(text: &Text) -> bool {
    date_pattern().is_match(text.raw())
}

pub(crate) fn is_bill(text: &Text) -> bool {
    text.has_any(BILL_PROVIDERS)
        || text.has_any(BILL_TERMS)
        || text.has_any(PAYMENT_MECHANISMS)
        || (has_date(text) && text.has_any(DATED_BILL_WORDS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Text {
        Text::new(s, None)
    }

    #[test]
    fn test_date_shapes() {
        assert!(has_date(&text("paid 12/05/2024")));
        assert!(has_date(&text("paid 1-5-24")));
        assert!(has_date(&text("ref 2024.05.12")));
        assert!(has_date(&text("on 12 May")));
        assert!(!has_date(&text("on 3rd")));
        assert!(!has_date(&text("card 4412")));
    }

    #[test]
    fn test_every_category_but_other_has_a_rule() {
        for category in Category::ALL {
            let covered = PRIORITY.iter().any(|(c, _)| *c == category);
            assert_eq!(covered, category != Category::Other, "{category}");
        }
    }
}
