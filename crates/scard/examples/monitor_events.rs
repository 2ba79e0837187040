//! Example showing how to monitor reader and card events

use scard::{CardEvent, Monitor, ReaderEvent};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut monitor = Monitor::create()?;

    let (card_sender, card_receiver) = scard::event::card_event_channel();
    let (reader_sender, reader_receiver) = scard::event::reader_event_channel();
    monitor.watch_cards(card_sender)?;
    monitor.watch_readers(reader_sender)?;

    println!("Monitoring reader and card events. Press Ctrl+C to exit.");

    loop {
        crossbeam_channel::select! {
            recv(card_receiver) -> event => match event {
                Ok(CardEvent::Inserted { reader, atr }) => {
                    println!("Card inserted in '{}', ATR {}", reader, hex::encode_upper(&atr));
                }
                Ok(CardEvent::Removed { reader }) => {
                    println!("Card removed from '{reader}'");
                }
                Err(_) => break,
            },
            recv(reader_receiver) -> event => match event {
                Ok(ReaderEvent::Added(name)) => println!("Reader attached: {name}"),
                Ok(ReaderEvent::Removed(name)) => println!("Reader detached: {name}"),
                Err(_) => break,
            },
        }
    }

    Ok(())
}
