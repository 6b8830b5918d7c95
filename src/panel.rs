use std::collections::HashMap;

use crate::domain::GeneSymbol;

#[derive(Debug, Clone)]
pub struct GenePanel {
    symbols: Vec<GeneSymbol>,
    lookup: HashMap<String, usize>,
}

impl GenePanel {
    pub fn new(entries: Vec<(GeneSymbol, Vec<GeneSymbol>)>) -> Self {
        let mut symbols = Vec::with_capacity(entries.len());
        let mut lookup = HashMap::new();
        for (symbol, aliases) in entries {
            let index = symbols.len();
            lookup.entry(symbol.folded()).or_insert(index);
            for alias in aliases {
                lookup.entry(alias.folded()).or_insert(index);
            }
            symbols.push(symbol);
        }
        Self { symbols, lookup }
    }

    pub fn symbols(&self) -> &[GeneSymbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn resolve(&self, raw: &str) -> Option<&GeneSymbol> {
        let folded = raw.trim().to_uppercase();
        if folded.is_empty() {
            return None;
        }
        self.lookup.get(&folded).map(|index| &self.symbols[*index])
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.resolve(raw).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> GenePanel {
        GenePanel::new(vec![
            (
                "TMEM173".parse().unwrap(),
                vec!["STING".parse().unwrap(), "STING1".parse().unwrap()],
            ),
            ("CCL5".parse().unwrap(), vec![]),
        ])
    }

    #[test]
    fn resolve_exact_and_case_insensitive() {
        let panel = panel();
        assert_eq!(panel.resolve("TMEM173").unwrap().as_str(), "TMEM173");
        assert_eq!(panel.resolve("tmem173").unwrap().as_str(), "TMEM173");
        assert_eq!(panel.resolve(" ccl5 ").unwrap().as_str(), "CCL5");
    }

    #[test]
    fn resolve_alias_to_canonical_symbol() {
        let panel = panel();
        assert_eq!(panel.resolve("sting1").unwrap().as_str(), "TMEM173");
    }

    #[test]
    fn unknown_symbols_do_not_resolve() {
        let panel = panel();
        assert!(panel.resolve("TP53").is_none());
        assert!(panel.resolve("").is_none());
    }
}
