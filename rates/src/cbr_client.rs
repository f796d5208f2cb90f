//! Central bank daily rates over HTTP.
//!
//! `GET {base}/scripts/XML_daily.asp?date_req=DD/MM/YYYY` answers with
//!
//! ```xml
//! <ValCurs Date="08.04.2018" name="Foreign Currency Market">
//!   <Valute ID="R01235">
//!     <NumCode>840</NumCode>
//!     <CharCode>USD</CharCode>
//!     <Nominal>1</Nominal>
//!     <Name>US Dollar</Name>
//!     <Value>57,0229</Value>
//!   </Valute>
//! </ValCurs>
//! ```
//!
//! Numbers use a comma as decimal separator.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::client::{DailyQuote, DailyRates, DailyRatesClient};
use crate::error::{RatesError, RatesResult};

pub const DEFAULT_BASE_URL: &str = "http://www.cbr.ru";

#[derive(Debug, Deserialize)]
struct ValCurs {
    #[serde(rename = "@Date")]
    date: String,
    #[serde(rename = "Valute", default)]
    valutes: Vec<Valute>,
}

#[derive(Debug, Deserialize)]
struct Valute {
    #[serde(rename = "@ID")]
    id: String,
    #[serde(rename = "CharCode")]
    char_code: String,
    #[serde(rename = "Nominal")]
    nominal: String,
    #[serde(rename = "Value")]
    value: String,
}

fn parse_number(raw: &str) -> RatesResult<Decimal> {
    let normalized = raw.trim().replace(',', ".");
    Decimal::from_str(&normalized).map_err(|e| RatesError::Parse(format!("number {:?}: {}", raw, e)))
}

/// Decode a `ValCurs` document.
pub fn parse_daily(xml: &str) -> RatesResult<DailyRates> {
    let doc: ValCurs = quick_xml::de::from_str(xml).map_err(|e| RatesError::Parse(format!("{e}")))?;
    let date = NaiveDate::parse_from_str(doc.date.trim(), "%d.%m.%Y")
        .map_err(|e| RatesError::Parse(format!("date {:?}: {}", doc.date, e)))?;

    let mut rates = DailyRates::new(date);
    for valute in doc.valutes {
        let quote = DailyQuote {
            char_code: valute.char_code.trim().to_string(),
            nominal: parse_number(&valute.nominal)?,
            value: parse_number(&valute.value)?,
        };
        rates.quotes.insert(valute.id, quote);
    }
    Ok(rates)
}

/// HTTP client for the central bank daily publication.
#[derive(Clone)]
pub struct CbrClient {
    client: Client,
    base_url: String,
}

impl CbrClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RatesResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RatesError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        format!(
            "{}/scripts/XML_daily.asp?date_req={}",
            self.base_url,
            date.format("%d/%m/%Y")
        )
    }
}

#[async_trait]
impl DailyRatesClient for CbrClient {
    #[instrument(skip(self))]
    async fn fetch_daily(&self, date: NaiveDate) -> RatesResult<DailyRates> {
        let url = self.url_for(date);
        debug!(url = %url, "Fetching daily rates");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_redirect() {
                RatesError::RedirectLoop(url.clone())
            } else {
                RatesError::Upstream(format!("{url}: {e}"))
            }
        })?;

        if !response.status().is_success() {
            return Err(RatesError::Upstream(format!("{url}: status {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RatesError::Upstream(format!("{url}: {e}")))?;
        parse_daily(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="windows-1251"?>
<ValCurs Date="07.04.2018" name="Foreign Currency Market">
  <Valute ID="R01235">
    <NumCode>840</NumCode>
    <CharCode>USD</CharCode>
    <Nominal>1</Nominal>
    <Name>US Dollar</Name>
    <Value>57,7275</Value>
  </Valute>
  <Valute ID="R01335">
    <NumCode>398</NumCode>
    <CharCode>KZT</CharCode>
    <Nominal>100</Nominal>
    <Name>Tenge</Name>
    <Value>17,9491</Value>
  </Valute>
</ValCurs>"#;

    #[test]
    fn test_parse_daily() {
        let rates = parse_daily(SAMPLE).unwrap();
        assert_eq!(rates.date, NaiveDate::from_ymd_opt(2018, 4, 7).unwrap());
        assert_eq!(rates.quotes.len(), 2);

        let usd = rates.quote("R01235").unwrap();
        assert_eq!(usd.char_code, "USD");
        assert_eq!(usd.value, dec!(57.7275));

        let kzt = rates.quote("R01335").unwrap();
        assert_eq!(kzt.nominal, dec!(100));
        assert_eq!(kzt.value, dec!(17.9491));
    }

    #[test]
    fn test_bad_number_is_parse_error() {
        let xml = r#"<ValCurs Date="07.04.2018"><Valute ID="R01235"><CharCode>USD</CharCode><Nominal>1</Nominal><Value>n/a</Value></Valute></ValCurs>"#;
        assert!(matches!(parse_daily(xml), Err(RatesError::Parse(_))));
    }

    #[test]
    fn test_url_format() {
        let client = CbrClient::new("http://www.cbr.ru/", Duration::from_secs(5)).unwrap();
        let date = NaiveDate::from_ymd_opt(2019, 1, 9).unwrap();
        assert_eq!(
            client.url_for(date),
            "http://www.cbr.ru/scripts/XML_daily.asp?date_req=09/01/2019"
        );
    }
}
