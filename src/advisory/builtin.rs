//! Built-in advisory content

use super::AdvisoryTable;

pub const TREATMENT_DEFAULT: &str = "Consult local expert";
pub const SAFETY_DEFAULT: &str = "Wear gloves and a mask when handling any crop protection product";
pub const MARKET_DEFAULT: &str = "Compare prices at your nearest agri-input dealer";
pub const SUSTAINABILITY_DEFAULT: &str = "Rotate crops and remove plant debris after harvest";

pub fn treatment() -> AdvisoryTable {
    AdvisoryTable::new(TREATMENT_DEFAULT, [
        ("Late_blight", "Use Mancozeb spray every 7 days"),
        ("Early_blight", "Apply Chlorothalonil fungicide"),
    ])
}

pub fn safety() -> AdvisoryTable {
    AdvisoryTable::new(SAFETY_DEFAULT, [
        ("Late_blight", "Mancozeb is an irritant: wear gloves, mask and goggles, and keep a 5 day pre-harvest interval"),
        ("Early_blight", "Avoid spraying Chlorothalonil in wind and keep children and livestock away for 24 hours"),
    ])
}

pub fn market() -> AdvisoryTable {
    AdvisoryTable::new(MARKET_DEFAULT, [
        ("Late_blight", "Generic Mancozeb 75% WP is the low-cost option, about 1 kg per acre per spray"),
        ("Early_blight", "Copper oxychloride is a cheaper alternative to branded Chlorothalonil"),
    ])
}

pub fn sustainability() -> AdvisoryTable {
    AdvisoryTable::new(SUSTAINABILITY_DEFAULT, [
        ("Late_blight", "Destroy infected plants, avoid overhead irrigation and plant resistant varieties next season"),
        ("Early_blight", "Mulch around plants and prune lower leaves to stop soil splash"),
    ])
}
