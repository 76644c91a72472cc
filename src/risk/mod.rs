pub mod eligibility;

pub use eligibility::check_eligibility;
