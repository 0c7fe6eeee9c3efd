pub mod commit;
pub(crate) mod payment;
pub mod reveal;
pub mod signer;
pub mod taproot;

use std::fmt;

use bitcoin::absolute::LockTime;
use bitcoin::psbt::{self, Psbt};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::{MintError, MintResult};

fn checked_sum(mut values: impl Iterator<Item = Amount>, side: &str) -> MintResult<Amount> {
    values
        .try_fold(Amount::ZERO, |total, value| total.checked_add(value))
        .ok_or_else(|| MintError::InvalidParameters(format!("{side} values overflow")))
}

/// Positional meaning of a PSBT input or output.
pub trait SlotRole: Copy + Eq + fmt::Debug + 'static {
    /// Whether a slot of this role may be placed right after `previous`
    /// (`None` for the first slot).
    fn may_follow(self, previous: Option<Self>) -> bool;

    /// Roles that must be present once building is done.
    fn required() -> &'static [Self];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealInput {
    /// Parent inscription, key-path signed by the oracle.
    Parent,
    /// Commit output, script-path spend revealing the inscription.
    Inscription,
    /// Payment input covering the fee.
    Fee,
}

impl SlotRole for RevealInput {
    fn may_follow(self, previous: Option<Self>) -> bool {
        matches!(
            (previous, self),
            (None, RevealInput::Parent)
                | (Some(RevealInput::Parent), RevealInput::Inscription)
                | (Some(RevealInput::Inscription | RevealInput::Fee), RevealInput::Fee)
        )
    }

    fn required() -> &'static [Self] {
        &[RevealInput::Parent, RevealInput::Inscription]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutput {
    /// Dust output passing the parent back to the oracle.
    ParentReturn,
    /// Postage output receiving the new inscription.
    Inscription,
    Change,
}

impl SlotRole for RevealOutput {
    fn may_follow(self, previous: Option<Self>) -> bool {
        matches!(
            (previous, self),
            (None, RevealOutput::ParentReturn)
                | (Some(RevealOutput::ParentReturn), RevealOutput::Inscription)
                | (Some(RevealOutput::Inscription), RevealOutput::Change)
        )
    }

    fn required() -> &'static [Self] {
        &[RevealOutput::ParentReturn, RevealOutput::Inscription]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitInput {
    Funding,
}

impl SlotRole for CommitInput {
    fn may_follow(self, _previous: Option<Self>) -> bool {
        true
    }

    fn required() -> &'static [Self] {
        &[CommitInput::Funding]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutput {
    /// Taproot output spent by the reveal, always at index 0.
    RevealFunding,
    Change,
}

impl SlotRole for CommitOutput {
    fn may_follow(self, previous: Option<Self>) -> bool {
        matches!(
            (previous, self),
            (None, CommitOutput::RevealFunding)
                | (Some(CommitOutput::RevealFunding), CommitOutput::Change)
        )
    }

    fn required() -> &'static [Self] {
        &[CommitOutput::RevealFunding]
    }
}

/// Unsigned PSBT whose inputs and outputs are appended in a fixed role order.
///
/// Every push is checked against the role of the previous slot, so a builder
/// cannot place e.g. a fee input before the parent.
#[derive(Debug, Clone)]
pub struct OrderedPsbt<I: SlotRole, O: SlotRole> {
    tx: Transaction,
    inputs: Vec<psbt::Input>,
    input_roles: Vec<I>,
    output_roles: Vec<O>,
}

impl<I: SlotRole, O: SlotRole> Default for OrderedPsbt<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: SlotRole, O: SlotRole> OrderedPsbt<I, O> {
    pub fn new() -> Self {
        Self {
            tx: Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input: Vec::new(),
                output: Vec::new(),
            },
            inputs: Vec::new(),
            input_roles: Vec::new(),
            output_roles: Vec::new(),
        }
    }

    /// Appends an input spending `previous_output` and returns its index.
    pub fn push_input(
        &mut self,
        role: I,
        previous_output: OutPoint,
        input: psbt::Input,
    ) -> MintResult<usize> {
        let position = self.input_roles.len();
        if !role.may_follow(self.input_roles.last().copied()) {
            return Err(MintError::SlotOrder {
                role: format!("input {role:?}"),
                position,
            });
        }

        self.tx.input.push(TxIn {
            previous_output,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::from_consensus(0xffffffff),
            witness: Witness::new(),
        });
        self.inputs.push(input);
        self.input_roles.push(role);

        Ok(position)
    }

    /// Appends an output and returns its index.
    pub fn push_output(&mut self, role: O, output: TxOut) -> MintResult<usize> {
        let position = self.output_roles.len();
        if !role.may_follow(self.output_roles.last().copied()) {
            return Err(MintError::SlotOrder {
                role: format!("output {role:?}"),
                position,
            });
        }

        self.tx.output.push(output);
        self.output_roles.push(role);

        Ok(position)
    }

    /// Sum of the `witness_utxo` values of the inputs.
    pub fn input_value(&self) -> MintResult<Amount> {
        checked_sum(
            self.inputs
                .iter()
                .filter_map(|input| input.witness_utxo.as_ref())
                .map(|txout| txout.value),
            "input",
        )
    }

    pub fn output_value(&self) -> MintResult<Amount> {
        checked_sum(self.tx.output.iter().map(|txout| txout.value), "output")
    }

    /// Checks that every required role is present and returns the PSBT.
    pub fn finish(self) -> MintResult<Psbt> {
        for required in I::required() {
            if !self.input_roles.contains(required) {
                return Err(MintError::SlotOrder {
                    role: format!("missing input {required:?}"),
                    position: self.input_roles.len(),
                });
            }
        }
        for required in O::required() {
            if !self.output_roles.contains(required) {
                return Err(MintError::SlotOrder {
                    role: format!("missing output {required:?}"),
                    position: self.output_roles.len(),
                });
            }
        }

        let mut psbt = Psbt::from_unsigned_tx(self.tx)?;
        psbt.inputs = self.inputs;

        Ok(psbt)
    }
}
