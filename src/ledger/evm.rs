//! EVM ledger client
//!
//! Dispenses claims from the pool wallet: native coin transfers via a signed
//! transaction request, ERC-20 transfers via the token contract. Submission
//! goes through alloy; confirmation checks poll `eth_getTransactionReceipt`
//! over raw JSON-RPC so a hung provider cannot wedge a claim past its bound.

use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use eyre::{Result, WrapErr};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::assets::{Asset, PoolRef};
use crate::config::LedgerConfig;
use crate::types::WalletAddress;

use super::{from_base_units, to_base_units, LedgerClient, LedgerError, TransferStatus};

sol! {
    /// Minimal ERC-20 interface: balance queries and transfers
    #[sol(rpc)]
    contract ERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// EVM transaction receipt from RPC
#[derive(Debug, Deserialize)]
struct TransactionReceipt {
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
    status: Option<String>,
}

/// EVM RPC response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// EVM RPC error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Ledger client for an EVM chain, dispensing from a single pool wallet
pub struct EvmLedgerClient {
    rpc_url: String,
    signer: PrivateKeySigner,
    pool_address: Address,
    required_confirmations: u32,
    client: Client,
}

impl EvmLedgerClient {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .wrap_err("Invalid pool private key")?;
        let pool_address = signer.address();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        info!(
            pool_address = %pool_address,
            chain_id = config.chain_id,
            required_confirmations = config.required_confirmations,
            "EVM ledger client initialized"
        );

        Ok(Self {
            rpc_url: config.rpc_url.clone(),
            signer,
            pool_address,
            required_confirmations: config.required_confirmations,
            client,
        })
    }

    fn parse_rpc_url(&self) -> Result<reqwest::Url, LedgerError> {
        self.rpc_url
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("invalid RPC URL: {}", e)))
    }

    fn parse_token_address(address: &str) -> Result<Address, LedgerError> {
        address
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("invalid token address {}: {}", address, e)))
    }

    /// Get transaction receipt from RPC
    async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
            "id": 1
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?
            .json::<RpcResponse<TransactionReceipt>>()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(LedgerError::Rpc(format!(
                "{} - {}",
                error.code, error.message
            )));
        }

        Ok(response.result)
    }

    /// Get current block number from RPC
    async fn get_block_number(&self) -> Result<u64, LedgerError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 1
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?
            .json::<RpcResponse<String>>()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(LedgerError::Rpc(format!(
                "{} - {}",
                error.code, error.message
            )));
        }

        let hex_block = response
            .result
            .ok_or_else(|| LedgerError::Rpc("empty eth_blockNumber result".to_string()))?;
        u64::from_str_radix(hex_block.trim_start_matches("0x"), 16)
            .map_err(|e| LedgerError::Rpc(format!("bad block number {}: {}", hex_block, e)))
    }
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    async fn pool_balance(&self, asset: &Asset) -> Result<BigDecimal, LedgerError> {
        let url = self.parse_rpc_url()?;
        let provider = ProviderBuilder::new().on_http(url);

        let raw = match &asset.pool {
            PoolRef::Native => provider
                .get_balance(self.pool_address)
                .await
                .map_err(|e| LedgerError::Rpc(e.to_string()))?,
            PoolRef::Token(address) => {
                let token = Self::parse_token_address(address)?;
                let erc20 = ERC20::new(token, provider);
                erc20
                    .balanceOf(self.pool_address)
                    .call()
                    .await
                    .map_err(|e| LedgerError::Rpc(e.to_string()))?
                    ._0
            }
        };

        Ok(from_base_units(raw, asset.decimals))
    }

    async fn submit_transfer(
        &self,
        asset: &Asset,
        to: &WalletAddress,
        amount: &BigDecimal,
    ) -> Result<String, LedgerError> {
        let url = self.parse_rpc_url()?;
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new().wallet(wallet).on_http(url);

        let recipient: Address = to
            .as_str()
            .parse()
            .map_err(|e| LedgerError::Submit(format!("invalid recipient {}: {}", to, e)))?;
        let raw = to_base_units(amount, asset.decimals)?;

        let tx_hash = match &asset.pool {
            PoolRef::Native => {
                let tx = TransactionRequest::default()
                    .with_to(recipient)
                    .with_value(raw);
                let pending = provider
                    .send_transaction(tx)
                    .await
                    .map_err(|e| LedgerError::Submit(e.to_string()))?;
                *pending.tx_hash()
            }
            PoolRef::Token(address) => {
                let token = Self::parse_token_address(address)?;
                let erc20 = ERC20::new(token, provider);
                let pending = erc20
                    .transfer(recipient, raw)
                    .send()
                    .await
                    .map_err(|e| LedgerError::Submit(e.to_string()))?;
                *pending.tx_hash()
            }
        };

        Ok(tx_hash.to_string())
    }

    async fn transfer_status(&self, transfer_ref: &str) -> Result<TransferStatus, LedgerError> {
        let receipt = match self.get_transaction_receipt(transfer_ref).await? {
            Some(receipt) => receipt,
            None => return Ok(TransferStatus::Pending),
        };

        if receipt.status.as_deref() == Some("0x0") {
            return Ok(TransferStatus::Failed);
        }

        let tx_block = receipt
            .block_number
            .as_deref()
            .and_then(|b| u64::from_str_radix(b.trim_start_matches("0x"), 16).ok());
        let tx_block = match tx_block {
            Some(block) => block,
            None => return Ok(TransferStatus::Pending),
        };

        let current_block = self.get_block_number().await?;
        let confirmations = current_block.saturating_sub(tx_block);

        if confirmations >= self.required_confirmations as u64 {
            Ok(TransferStatus::Confirmed)
        } else {
            Ok(TransferStatus::Pending)
        }
    }
}
