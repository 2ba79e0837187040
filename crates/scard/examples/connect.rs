//! Example showing how to wait for a card and exchange an APDU with it

use scard::{Context, Protocols, ReaderState, Scope, ShareMode, StateFlags};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Establish a session with the resource manager
    let context = Context::establish(Scope::System)?;

    // List available readers
    let readers = context.list_readers()?;
    println!("Found {} readers:", readers.len());
    for (i, reader) in readers.iter().enumerate() {
        println!("  [{i}] {reader}");
    }

    let Some(reader) = readers.first() else {
        println!("No reader attached; plug one in and try again.");
        return Ok(());
    };

    // Block until a card is present in the first reader
    println!("Waiting for a card in {reader}...");
    let mut states = vec![ReaderState::new(reader.clone())];
    while !states[0].event_state.contains(StateFlags::PRESENT) {
        context.get_status_change(&mut states, None)?;
        states[0].sync();
    }

    // Connect and show the card status
    let card = context.connect(reader, ShareMode::Exclusive, Protocols::ANY)?;
    let status = card.status()?;
    println!("Connected:");
    println!("  reader:   {}", status.reader);
    println!("  state:    {:?}", status.state);
    println!("  protocol: {:?}", status.protocol);
    println!("  atr:      {}", hex::encode_upper(&status.atr));

    // SELECT the master file
    let command = [0x00, 0xA4, 0x00, 0x0C, 0x02, 0x3F, 0x00];
    println!("> {}", hex::encode_upper(command));
    let response = card.transmit(&command)?;
    println!("< {}", hex::encode_upper(&response));

    card.disconnect(scard::Disposition::Reset)?;
    context.release()?;
    Ok(())
}
