// =============================================================================
// Transaction view & classification
// =============================================================================
//
// Only the first parsed `transfer` instruction is lifted into
// `from`/`to`/`lamports`; every instruction still contributes its program id
// and parsed type so DEX interactions can be recognised.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Known centralized-exchange hot wallets.
const CEX_ADDRESSES: &[(&str, &str)] = &[
    ("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", "Binance"),
    ("BSxLLQWFbNwDrK1PvNQbJxZeqkRc5LjvNi8vJJWJigHc", "Binance"),
    ("GbTQKhL7BCTvuYetJQeQZgGTqEHM2rFZVUdKPvSKaM2B", "Binance"),
    ("GJR8pNeRDWNWZ6Wy5Eix1emxNRwj8xrQmCJiKCF3GTG1", "OKX"),
    ("2tUokhMnqAJgP5uv5QKNfa1UA5GhPfgSJ4krk2phPvMH", "OKX"),
    ("2vRqFpAVTpz46zUPkQvPqJYLszwuTdPb3vBqTJLHgrvm", "Kucoin"),
    ("2mCTG7jRoHG8xQjS3xjrC5vQBzMJYzwBmJFXKJ1r7Zk5", "FTX"),
    ("3FuYPMXJHVF8UQcZCCchG3uQvNx8FD8aQbT8zJ9JKBpj", "Coinbase"),
];

/// Known DEX program ids.
const DEX_PROGRAMS: &[(&str, &str)] = &[
    ("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin", "Serum"),
    ("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8", "Raydium"),
    ("9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP", "Orca"),
    ("SSwpkEEcbUqx4vtoEByFjSkhKdCT862DNVb52nZg1UZ", "Saber"),
];

/// Parsed instruction types that only appear in DEX flows.
const DEX_INSTRUCTION_TYPES: &[&str] = &["swap", "trade", "liquidityPool", "settleFunds"];

pub fn exchange_name(address: &str) -> Option<&'static str> {
    CEX_ADDRESSES
        .iter()
        .find(|(a, _)| *a == address)
        .map(|(_, name)| *name)
}

pub fn dex_name(program_id: &str) -> Option<&'static str> {
    DEX_PROGRAMS
        .iter()
        .find(|(p, _)| *p == program_id)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    /// Funds moving onto an exchange wallet.
    ExchangeInflow,
    /// Funds leaving an exchange wallet.
    ExchangeOutflow,
    Dex,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub fee: u64,
    pub is_success: bool,
    pub lamports: Option<u64>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub program_ids: Vec<String>,
    pub instruction_types: Vec<String>,
}

impl TransactionInfo {
    /// Build from a `getTransaction` result requested with `jsonParsed`.
    pub fn from_rpc(signature: &str, tx: &Value) -> Self {
        let meta = &tx["meta"];
        let mut info = Self {
            signature: signature.to_string(),
            slot: tx["slot"].as_u64().unwrap_or(0),
            block_time: tx["blockTime"].as_i64(),
            fee: meta["fee"].as_u64().unwrap_or(0),
            is_success: meta.get("err").map_or(true, Value::is_null),
            lamports: None,
            from_address: None,
            to_address: None,
            program_ids: Vec::new(),
            instruction_types: Vec::new(),
        };

        let instructions = tx["transaction"]["message"]["instructions"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default();

        for instr in instructions {
            if let Some(pid) = instr["programId"].as_str() {
                info.program_ids.push(pid.to_string());
            }
            let parsed = &instr["parsed"];
            let Some(kind) = parsed["type"].as_str() else {
                continue;
            };
            info.instruction_types.push(kind.to_string());
            if kind == "transfer" && info.lamports.is_none() {
                let detail = &parsed["info"];
                info.from_address = detail["source"].as_str().map(str::to_string);
                info.to_address = detail["destination"].as_str().map(str::to_string);
                info.lamports = detail["lamports"].as_u64();
            }
        }
        info
    }

    pub fn sol(&self) -> f64 {
        self.lamports.unwrap_or(0) as f64 / LAMPORTS_PER_SOL as f64
    }

    /// Classify by counterparty.  A transfer between two exchange wallets is
    /// internal bookkeeping and classifies as `Unknown`.
    pub fn classify(&self) -> TxKind {
        let from_cex = self.from_address.as_deref().and_then(exchange_name).is_some();
        let to_cex = self.to_address.as_deref().and_then(exchange_name).is_some();
        match (from_cex, to_cex) {
            (false, true) => return TxKind::ExchangeInflow,
            (true, false) => return TxKind::ExchangeOutflow,
            (true, true) => return TxKind::Unknown,
            (false, false) => {}
        }

        let dex_program = self.program_ids.iter().any(|p| dex_name(p).is_some());
        let dex_instruction = self
            .instruction_types
            .iter()
            .any(|t| DEX_INSTRUCTION_TYPES.contains(&t.as_str()));
        if dex_program || dex_instruction {
            TxKind::Dex
        } else {
            TxKind::Unknown
        }
    }

    /// Successful transfer of at least `threshold_sol`.
    pub fn is_whale(&self, threshold_sol: u64) -> bool {
        self.is_success
            && self
                .lamports
                .is_some_and(|l| l >= threshold_sol.saturating_mul(LAMPORTS_PER_SOL))
    }
}

/// Filter `sample` down to whale transfers.
pub fn whale_transfers_in(sample: &[TransactionInfo], threshold_sol: u64) -> Vec<TransactionInfo> {
    sample
        .iter()
        .filter(|tx| tx.is_whale(threshold_sol))
        .cloned()
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) const BINANCE_WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    pub(crate) const RAYDIUM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

    pub(crate) fn transfer(from: &str, to: &str, sol: u64) -> TransactionInfo {
        TransactionInfo {
            signature: format!("{from}->{to}"),
            slot: 1,
            block_time: Some(1_700_000_000),
            fee: 5000,
            is_success: true,
            lamports: Some(sol * LAMPORTS_PER_SOL),
            from_address: Some(from.to_string()),
            to_address: Some(to.to_string()),
            program_ids: vec!["11111111111111111111111111111111".into()],
            instruction_types: vec!["transfer".into()],
        }
    }

    #[test]
    fn parses_json_parsed_transfer() {
        let raw = json!({
            "slot": 250000000u64,
            "blockTime": 1700000000i64,
            "meta": {"fee": 5000, "err": null},
            "transaction": {"message": {"instructions": [
                {"programId": "ComputeBudget111111111111111111111111111111", "data": "3gJqkocMWaMm"},
                {"programId": "11111111111111111111111111111111", "parsed": {
                    "type": "transfer",
                    "info": {"source": "alice", "destination": "bob", "lamports": 2500000000u64}
                }}
            ]}}
        });
        let tx = TransactionInfo::from_rpc("sig1", &raw);
        assert_eq!(tx.slot, 250000000);
        assert!(tx.is_success);
        assert_eq!(tx.from_address.as_deref(), Some("alice"));
        assert_eq!(tx.lamports, Some(2_500_000_000));
        assert_eq!(tx.program_ids.len(), 2);
        assert!((tx.sol() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn failed_transaction_is_never_a_whale() {
        let raw = json!({"meta": {"fee": 5000, "err": {"InstructionError": [0, "Custom"]}}});
        let tx = TransactionInfo::from_rpc("sig", &raw);
        assert!(!tx.is_success);

        let mut big = transfer("a", "b", 10_000);
        assert!(big.is_whale(500));
        big.is_success = false;
        assert!(!big.is_whale(500));
    }

    #[test]
    fn classifies_by_counterparty() {
        assert_eq!(transfer("user", BINANCE_WALLET, 1).classify(), TxKind::ExchangeInflow);
        assert_eq!(transfer(BINANCE_WALLET, "user", 1).classify(), TxKind::ExchangeOutflow);
        assert_eq!(
            transfer(BINANCE_WALLET, "GJR8pNeRDWNWZ6Wy5Eix1emxNRwj8xrQmCJiKCF3GTG1", 1).classify(),
            TxKind::Unknown
        );

        let mut swap = transfer("a", "b", 1);
        swap.program_ids.push(RAYDIUM.into());
        assert_eq!(swap.classify(), TxKind::Dex);

        let mut settle = transfer("a", "b", 1);
        settle.instruction_types.push("settleFunds".into());
        assert_eq!(settle.classify(), TxKind::Dex);

        assert_eq!(transfer("a", "b", 1).classify(), TxKind::Unknown);
    }

    #[test]
    fn whale_filter_uses_threshold_in_sol() {
        let sample = vec![transfer("a", "b", 499), transfer("a", "b", 500), transfer("a", "b", 7000)];
        let whales = whale_transfers_in(&sample, 500);
        assert_eq!(whales.len(), 2);
    }
}
