//! Shared test double: a scriptable in-memory Transport
//!
//! Tests hand the mock a script of boundary-call outcomes and inspect the
//! log of calls afterwards. Leaked references keep the `'static` lifetime
//! the library expects from a process-wide transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::ffi::CString;
use std::sync::Mutex;

use scard::error::{Error, Result};
use scard::reader::CardStatus;
use scard::transport::{ProtocolHeader, RawContext, RawHandle, Transport, WatchRecord};
use scard::types::{CardState, Disposition, Protocol, Protocols, Scope, ShareMode, MAX_ATR_SIZE};

/// ATR the mock reports for its simulated card
pub const MOCK_ATR: &[u8] = &[0x3B, 0x95, 0x18, 0x40, 0xFF, 0x62, 0x01, 0x02, 0x01, 0x04];

/// One scripted outcome of the status-change wait: per-descriptor
/// (event mask, reported ATR), in request order
pub type WaitOutcome = Result<Vec<(u32, Vec<u8>)>>;

/// Recorded status-change invocation
#[derive(Debug, Clone)]
pub struct WaitCall {
    pub timeout_ms: u32,
    pub readers: Vec<String>,
    pub current_states: Vec<u32>,
}

/// Recorded transmit invocation
#[derive(Debug, Clone)]
pub struct TransmitCall {
    pub header: ProtocolHeader,
    pub command: Vec<u8>,
    pub recv_capacity: usize,
}

#[derive(Debug)]
struct Inner {
    next_context: RawContext,
    readers: Vec<String>,
    list_readers_script: VecDeque<Result<()>>,
    groups: Vec<String>,
    calls: Vec<&'static str>,
    is_valid_outcome: Result<()>,
    wait_script: VecDeque<WaitOutcome>,
    wait_calls: Vec<WaitCall>,
    connect_outcome: Result<Protocol>,
    connected_reader: Option<String>,
    active_protocol: Protocol,
    reconnect_script: VecDeque<Result<Protocol>>,
    transmit_script: VecDeque<Result<Vec<u8>>>,
    transmit_calls: Vec<TransmitCall>,
    control_calls: Vec<(u32, Vec<u8>)>,
    control_response: Vec<u8>,
    attrib_value: Vec<u8>,
    set_attrib_calls: Vec<(u32, Vec<u8>)>,
    begin_count: usize,
    end_dispositions: Vec<Disposition>,
    disconnect_dispositions: Vec<Disposition>,
}

/// Scriptable in-memory implementation of the boundary-call surface
#[derive(Debug)]
pub struct MockTransport {
    inner: Mutex<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_context: 0,
                readers: vec!["Mock Reader 00".to_owned()],
                list_readers_script: VecDeque::new(),
                groups: vec!["SCard$DefaultReaders".to_owned()],
                calls: Vec::new(),
                is_valid_outcome: Ok(()),
                wait_script: VecDeque::new(),
                wait_calls: Vec::new(),
                connect_outcome: Ok(Protocol::T1),
                connected_reader: None,
                active_protocol: Protocol::Undefined,
                reconnect_script: VecDeque::new(),
                transmit_script: VecDeque::new(),
                transmit_calls: Vec::new(),
                control_calls: Vec::new(),
                control_response: Vec::new(),
                attrib_value: Vec::new(),
                set_attrib_calls: Vec::new(),
                begin_count: 0,
                end_dispositions: Vec::new(),
                disconnect_dispositions: Vec::new(),
            }),
        }
    }

    /// Leak a mock to obtain the `'static` reference the library expects
    pub fn leaked() -> &'static Self {
        Box::leak(Box::new(Self::new()))
    }

    pub fn set_readers(&self, names: &[&str]) {
        self.inner.lock().unwrap().readers = names.iter().map(|s| (*s).to_owned()).collect();
    }

    /// Script the outcome of one whole reader listing (size plus fill); an
    /// exhausted script reads as success over the configured reader set
    pub fn push_list_readers_outcome(&self, outcome: Result<()>) {
        self.inner
            .lock()
            .unwrap()
            .list_readers_script
            .push_back(outcome);
    }

    pub fn set_is_valid(&self, outcome: Result<()>) {
        self.inner.lock().unwrap().is_valid_outcome = outcome;
    }

    pub fn set_connect_outcome(&self, outcome: Result<Protocol>) {
        self.inner.lock().unwrap().connect_outcome = outcome;
    }

    pub fn push_wait(&self, outcome: WaitOutcome) {
        self.inner.lock().unwrap().wait_script.push_back(outcome);
    }

    pub fn push_reconnect(&self, outcome: Result<Protocol>) {
        self.inner.lock().unwrap().reconnect_script.push_back(outcome);
    }

    pub fn push_transmit(&self, outcome: Result<Vec<u8>>) {
        self.inner.lock().unwrap().transmit_script.push_back(outcome);
    }

    pub fn set_control_response(&self, response: &[u8]) {
        self.inner.lock().unwrap().control_response = response.to_vec();
    }

    pub fn set_attrib_value(&self, value: &[u8]) {
        self.inner.lock().unwrap().attrib_value = value.to_vec();
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == name)
            .count()
    }

    pub fn wait_calls(&self) -> Vec<WaitCall> {
        self.inner.lock().unwrap().wait_calls.clone()
    }

    pub fn transmit_calls(&self) -> Vec<TransmitCall> {
        self.inner.lock().unwrap().transmit_calls.clone()
    }

    pub fn control_calls(&self) -> Vec<(u32, Vec<u8>)> {
        self.inner.lock().unwrap().control_calls.clone()
    }

    pub fn set_attrib_calls(&self) -> Vec<(u32, Vec<u8>)> {
        self.inner.lock().unwrap().set_attrib_calls.clone()
    }

    pub fn begin_count(&self) -> usize {
        self.inner.lock().unwrap().begin_count
    }

    pub fn end_dispositions(&self) -> Vec<Disposition> {
        self.inner.lock().unwrap().end_dispositions.clone()
    }

    pub fn disconnect_dispositions(&self) -> Vec<Disposition> {
        self.inner.lock().unwrap().disconnect_dispositions.clone()
    }

    fn multi_string(names: &[String]) -> Vec<u8> {
        let mut buf = Vec::new();
        for name in names {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
        }
        buf.push(0);
        buf
    }

    fn list(names: &[String], buf: Option<&mut [u8]>) -> Result<usize> {
        if names.is_empty() {
            return Err(Error::NoReadersAvailable);
        }
        let encoded = Self::multi_string(names);
        match buf {
            None => Ok(encoded.len()),
            Some(buf) => {
                if buf.len() < encoded.len() {
                    return Err(Error::InsufficientBuffer);
                }
                buf[..encoded.len()].copy_from_slice(&encoded);
                Ok(encoded.len())
            }
        }
    }
}

impl Transport for MockTransport {
    fn establish(&self, _scope: Scope) -> Result<RawContext> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("establish");
        inner.next_context += 1;
        Ok(inner.next_context)
    }

    fn release(&self, _context: RawContext) -> Result<()> {
        self.inner.lock().unwrap().calls.push("release");
        Ok(())
    }

    fn is_valid(&self, _context: RawContext) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("is_valid");
        inner.is_valid_outcome
    }

    fn cancel(&self, _context: RawContext) -> Result<()> {
        self.inner.lock().unwrap().calls.push("cancel");
        Ok(())
    }

    fn list_readers(&self, _context: RawContext, buf: Option<&mut [u8]>) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("list_readers");
        // The script is consulted once per listing, on its size phase.
        if buf.is_none() {
            if let Some(outcome) = inner.list_readers_script.pop_front() {
                outcome?;
            }
        }
        let names = inner.readers.clone();
        drop(inner);
        Self::list(&names, buf)
    }

    fn list_reader_groups(&self, _context: RawContext, buf: Option<&mut [u8]>) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("list_reader_groups");
        let names = inner.groups.clone();
        drop(inner);
        Self::list(&names, buf)
    }

    fn wait_status_change(
        &self,
        _context: RawContext,
        timeout_ms: u32,
        records: &mut [WatchRecord],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("wait_status_change");
        inner.wait_calls.push(WaitCall {
            timeout_ms,
            readers: records
                .iter()
                .map(|r| r.reader.to_string_lossy().into_owned())
                .collect(),
            current_states: records.iter().map(|r| r.current_state).collect(),
        });
        // An exhausted script reads as a cancel, so loops terminate.
        let outcome = inner
            .wait_script
            .pop_front()
            .unwrap_or(Err(Error::Cancelled));
        let entries = outcome?;
        for (record, (event_state, atr)) in records.iter_mut().zip(entries) {
            record.event_state = event_state;
            if !atr.is_empty() {
                let len = atr.len().min(MAX_ATR_SIZE);
                record.atr[..len].copy_from_slice(&atr[..len]);
                record.atr_len = len;
            }
        }
        Ok(())
    }

    fn connect(
        &self,
        _context: RawContext,
        reader: &CString,
        _mode: ShareMode,
        _preferred: Protocols,
    ) -> Result<(RawHandle, Protocol)> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("connect");
        let protocol = inner.connect_outcome?;
        inner.connected_reader = Some(reader.to_string_lossy().into_owned());
        inner.active_protocol = protocol;
        Ok((0x51, protocol))
    }

    fn reconnect(
        &self,
        _card: RawHandle,
        _mode: ShareMode,
        _preferred: Protocols,
        _initialization: Disposition,
    ) -> Result<Protocol> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("reconnect");
        let outcome = inner
            .reconnect_script
            .pop_front()
            .unwrap_or(Ok(inner.active_protocol));
        let protocol = outcome?;
        inner.active_protocol = protocol;
        Ok(protocol)
    }

    fn disconnect(&self, _card: RawHandle, disposition: Disposition) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("disconnect");
        inner.disconnect_dispositions.push(disposition);
        Ok(())
    }

    fn begin_transaction(&self, _card: RawHandle) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("begin_transaction");
        inner.begin_count += 1;
        Ok(())
    }

    fn end_transaction(&self, _card: RawHandle, disposition: Disposition) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("end_transaction");
        inner.end_dispositions.push(disposition);
        Ok(())
    }

    fn status(&self, _card: RawHandle) -> Result<CardStatus> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("status");
        Ok(CardStatus {
            reader: inner.connected_reader.clone().unwrap_or_default(),
            state: CardState::PRESENT | CardState::POWERED,
            protocol: inner.active_protocol,
            atr: MOCK_ATR.to_vec(),
        })
    }

    fn transmit(
        &self,
        _card: RawHandle,
        header: ProtocolHeader,
        command: &[u8],
        recv: &mut [u8],
    ) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("transmit");
        inner.transmit_calls.push(TransmitCall {
            header,
            command: command.to_vec(),
            recv_capacity: recv.len(),
        });
        let response = inner
            .transmit_script
            .pop_front()
            .unwrap_or(Ok(vec![0x90, 0x00]))?;
        let len = response.len().min(recv.len());
        recv[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }

    fn control(
        &self,
        _card: RawHandle,
        code: u32,
        input: &[u8],
        recv: &mut [u8],
    ) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("control");
        inner.control_calls.push((code, input.to_vec()));
        let response = inner.control_response.clone();
        let len = response.len().min(recv.len());
        recv[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }

    fn get_attrib(&self, _card: RawHandle, _id: u32, buf: Option<&mut [u8]>) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("get_attrib");
        let value = inner.attrib_value.clone();
        drop(inner);
        match buf {
            None => Ok(value.len()),
            Some(buf) => {
                if buf.len() < value.len() {
                    return Err(Error::InsufficientBuffer);
                }
                buf[..value.len()].copy_from_slice(&value);
                Ok(value.len())
            }
        }
    }

    fn set_attrib(&self, _card: RawHandle, id: u32, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("set_attrib");
        inner.set_attrib_calls.push((id, data.to_vec()));
        Ok(())
    }
}
