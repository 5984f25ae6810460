//! L2 -> L1 messages carried by rollup receipts; the input of both
//! withdrawal finalization and interop relaying.

use crate::abi::{decode_l1_message, l1_message_sent_topic};
use crate::client::TxReceipt;
use crate::errors::{Result, SdkError};
use alloy_primitives::{Address, Bytes};

/// One `L1MessageSent` emitted by the messenger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1Message {
    /// Position among the receipt's L2 -> L1 messages; the log proof index.
    pub index: u32,
    pub sender: Address,
    pub message: Bytes,
}

/// First messenger log whose sender is one of `senders`.
pub fn find_l1_message(
    receipt: &TxReceipt,
    messenger: Address,
    senders: &[Address],
) -> Result<L1Message> {
    let topic = l1_message_sent_topic();
    let found = receipt
        .logs
        .iter()
        .filter(|log| log.address == messenger && log.topic0() == Some(topic))
        .enumerate()
        .find_map(|(index, log)| {
            let sender = Address::from_word(*log.topics.get(1)?);
            senders.contains(&sender).then_some((index, sender, log))
        });
    let Some((index, sender, log)) = found else {
        return Err(SdkError::contract("receipt carries no matching L1MessageSent log")
            .with_operation("messages.find")
            .with_context("txHash", receipt.transaction_hash));
    };
    let message = decode_l1_message(&log.data)?;
    let index = u32::try_from(index).map_err(|_| SdkError::contract("message index out of range"))?;
    Ok(L1Message { index, sender, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{log, receipt};
    use crate::types::{address_topic, L1_MESSENGER_ADDRESS};
    use alloy_primitives::B256;
    use alloy_sol_types::SolValue;

    #[test]
    fn message_comes_from_the_messenger_log() {
        let sender = Address::repeat_byte(0x0a);
        let payload = Bytes::from(vec![1, 2, 3]);
        let other = Address::repeat_byte(0x0b);
        let logs = vec![
            log(Address::repeat_byte(9), vec![l1_message_sent_topic()], Vec::new()),
            log(
                L1_MESSENGER_ADDRESS,
                vec![l1_message_sent_topic(), address_topic(other), B256::ZERO],
                (Bytes::new(),).abi_encode_params(),
            ),
            log(
                L1_MESSENGER_ADDRESS,
                vec![l1_message_sent_topic(), address_topic(sender), B256::ZERO],
                (payload.clone(),).abi_encode_params(),
            ),
        ];
        let mined = receipt(B256::ZERO, true, logs);
        let found = find_l1_message(&mined, L1_MESSENGER_ADDRESS, &[sender]).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.sender, sender);
        assert_eq!(found.message, payload);
    }

    #[test]
    fn missing_message_is_a_contract_error() {
        let mined = receipt(B256::ZERO, true, Vec::new());
        let err = find_l1_message(&mined, L1_MESSENGER_ADDRESS, &[]).unwrap_err();
        assert!(err.is(crate::errors::ErrorKind::Contract));
    }
}
