//! Call builders and return decoders for the fixed-ABI price and entropy contracts

use super::{Address, Bytes, ChainError, TransactionReceipt, B256, U256};
use crate::models::{FeedId, PriceQuote};
use alloy_sol_types::{sol, SolCall};

sol! {
    /// Pull-oracle price contract
    interface IPyth {
        struct Price {
            int64 price;
            uint64 conf;
            int32 expo;
            uint256 publishTime;
        }

        function updatePriceFeeds(bytes[] calldata updateData) external payable;
        function getUpdateFee(bytes[] calldata updateData) external view returns (uint256 feeAmount);
        function getPriceNoOlderThan(bytes32 id, uint256 age) external view returns (Price memory price);
    }

    /// Entropy contract; the sequence number is read from the request log
    interface IEntropy {
        function request(address provider, bytes32 userCommitment, bool useBlockHash) external payable returns (uint64 assignedSequenceNumber);
        function getRequest(address provider, uint64 sequenceNumber) external view returns (bytes32 commitment, uint64 blockNumber, bool fulfilled);
        function getFee(address provider) external view returns (uint128 feeAmount);
        function reveal(address provider, uint64 sequenceNumber, bytes32 userRevelation, bytes32 providerRevelation) external returns (bytes32 randomNumber);
    }
}

fn update_data(payload: &[Vec<u8>]) -> Vec<Bytes> {
    payload.iter().cloned().map(Bytes::from).collect()
}

/// Pull-oracle price contract
#[derive(Debug, Clone, Copy)]
pub struct PriceContract {
    pub address: Address,
}

impl PriceContract {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn update_price_feeds(&self, payload: &[Vec<u8>]) -> Bytes {
        IPyth::updatePriceFeedsCall {
            updateData: update_data(payload),
        }
        .abi_encode()
        .into()
    }

    pub fn get_update_fee(&self, payload: &[Vec<u8>]) -> Bytes {
        IPyth::getUpdateFeeCall {
            updateData: update_data(payload),
        }
        .abi_encode()
        .into()
    }

    pub fn get_price_no_older_than(&self, feed_id: &FeedId, max_age_secs: u64) -> Bytes {
        IPyth::getPriceNoOlderThanCall {
            id: B256::from(feed_id.to_bytes32()),
            age: U256::from(max_age_secs),
        }
        .abi_encode()
        .into()
    }

    pub fn decode_fee(&self, data: &[u8]) -> Result<U256, ChainError> {
        Ok(IPyth::getUpdateFeeCall::abi_decode_returns(data, true)?.feeAmount)
    }

    pub fn decode_price(&self, data: &[u8]) -> Result<PriceQuote, ChainError> {
        let price = IPyth::getPriceNoOlderThanCall::abi_decode_returns(data, true)?.price;

        let publish_time = u64::try_from(price.publishTime)
            .ok()
            .and_then(|t| i64::try_from(t).ok())
            .ok_or_else(|| ChainError::Decode("publish time out of range".to_string()))?;

        Ok(PriceQuote {
            price: price.price,
            conf: price.conf,
            expo: price.expo,
            publish_time,
        })
    }
}

/// State of a randomness request as recorded by the entropy contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChainRequest {
    pub commitment: B256,
    pub block_number: u64,
    pub fulfilled: bool,
}

/// Entropy contract bound to one randomness provider
#[derive(Debug, Clone, Copy)]
pub struct EntropyContract {
    pub address: Address,
    pub provider: Address,
}

impl EntropyContract {
    pub fn new(address: Address, provider: Address) -> Self {
        Self { address, provider }
    }

    pub fn get_fee(&self) -> Bytes {
        IEntropy::getFeeCall {
            provider: self.provider,
        }
        .abi_encode()
        .into()
    }

    pub fn request(&self, commitment: B256, use_block_hash: bool) -> Bytes {
        IEntropy::requestCall {
            provider: self.provider,
            userCommitment: commitment,
            useBlockHash: use_block_hash,
        }
        .abi_encode()
        .into()
    }

    pub fn get_request(&self, sequence_number: u64) -> Bytes {
        IEntropy::getRequestCall {
            provider: self.provider,
            sequenceNumber: sequence_number,
        }
        .abi_encode()
        .into()
    }

    pub fn reveal(&self, sequence_number: u64, commitment: B256, provider_revelation: B256) -> Bytes {
        IEntropy::revealCall {
            provider: self.provider,
            sequenceNumber: sequence_number,
            userRevelation: commitment,
            providerRevelation: provider_revelation,
        }
        .abi_encode()
        .into()
    }

    pub fn decode_fee(&self, data: &[u8]) -> Result<u128, ChainError> {
        Ok(IEntropy::getFeeCall::abi_decode_returns(data, true)?.feeAmount)
    }

    pub fn decode_request(&self, data: &[u8]) -> Result<OnChainRequest, ChainError> {
        let ret = IEntropy::getRequestCall::abi_decode_returns(data, true)?;
        Ok(OnChainRequest {
            commitment: ret.commitment,
            block_number: ret.blockNumber,
            fulfilled: ret.fulfilled,
        })
    }

    pub fn decode_reveal(&self, data: &[u8]) -> Result<B256, ChainError> {
        Ok(IEntropy::revealCall::abi_decode_returns(data, true)?.randomNumber)
    }

    /// Sequence number assigned to a request, read from `topics[1]` of the
    /// first log the entropy contract emitted in the receipt
    pub fn sequence_from_receipt(&self, receipt: &TransactionReceipt) -> Result<u64, ChainError> {
        let log = receipt
            .logs
            .iter()
            .find(|log| log.address == self.address)
            .ok_or_else(|| ChainError::Decode("no entropy log in receipt".to_string()))?;

        let topic = log
            .data
            .topics()
            .get(1)
            .ok_or_else(|| ChainError::Decode("entropy log has no sequence topic".to_string()))?;

        u64::try_from(U256::from_be_bytes(topic.0))
            .map_err(|_| ChainError::Decode(format!("sequence topic {} exceeds u64", topic)))
    }
}
