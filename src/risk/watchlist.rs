use alloy::primitives::Address;
use std::collections::HashMap;
use std::str::FromStr;

/// Addresses independently known to be high risk (sanctions lists, exploit
/// wallets, mixers). Feeds the known-risk factor of cluster scoring.
#[derive(Debug, Clone, Default)]
pub struct KnownRiskSet {
    labels: HashMap<Address, String>,
}

impl KnownRiskSet {
    pub fn new(entries: impl IntoIterator<Item = (Address, String)>) -> Self {
        Self {
            labels: entries.into_iter().collect(),
        }
    }

    /// Parse a CSV with an `address` column and an optional `label` column.
    /// Rows whose address does not parse are skipped.
    pub fn load_csv(path: &str) -> eyre::Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| eyre::eyre!("Failed to open known-risk CSV '{}': {}", path, e))?;

        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> eyre::Result<Self> {
        let headers = reader.headers()?.clone();
        let address_col = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("address"))
            .ok_or_else(|| eyre::eyre!("Known-risk CSV has no 'address' column"))?;
        let label_col = headers.iter().position(|h| h.eq_ignore_ascii_case("label"));

        let mut labels = HashMap::new();
        let mut skipped = 0usize;
        for result in reader.records() {
            let record = result?;
            let raw = record.get(address_col).unwrap_or("");
            let address = match Address::from_str(raw) {
                Ok(a) => a,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let label = label_col
                .and_then(|i| record.get(i))
                .filter(|l| !l.is_empty())
                .unwrap_or("known_risk")
                .to_string();
            labels.insert(address, label);
        }

        tracing::info!(addresses = labels.len(), skipped, "Loaded known-risk addresses");
        Ok(Self { labels })
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.labels.contains_key(address)
    }

    pub fn label(&self, address: &Address) -> Option<&str> {
        self.labels.get(address).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
