pub mod quote;
pub mod validator;

use metrics::describe_counter;
use once_cell::sync::OnceCell;

pub use quote::{Quote, QuoteError, QuoteProvider, YahooQuoteProvider};
pub use validator::{
    should_act_on_signal, Asset, AssetType, MarketConfirmation, MarketValidator, Sentiment,
    ValidatorConfig,
};

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "market_validations_total",
            "Market checks by outcome (confirmed, no_quote, no_ticker)."
        );
    });
}
