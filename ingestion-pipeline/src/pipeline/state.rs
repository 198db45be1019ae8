use state_machines::state_machine;

state_machine! {
    name: ExtractionMachine,
    state: ExtractionState,
    initial: Ready,
    states: [Ready, Extracted, Recorded],
    events {
        extract { transition: { from: Ready, to: Extracted } }
        record { transition: { from: Extracted, to: Recorded } }
    }
}

pub fn ready() -> ExtractionMachine<(), Ready> {
    ExtractionMachine::new(())
}
