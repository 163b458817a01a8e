//! EMV protocol implementation: application discovery and record reading

use std::collections::BTreeMap;

use serde::Serialize;
use tapkit_common::tlv::{self, find_node, flatten_into, TlvNode};
use tapkit_common::{find_tag, tags, to_hex};
use tracing::{debug, info, warn};

use crate::aip::Aip;
use crate::apdu::{commands, exchange_with_chaining, ApduCommand, ApduResponse, ChainingLimits};
use crate::config::SessionConfig;
use crate::cvm::CvmList;
use crate::dol::Dol;
use crate::error::{Error, Result, TransportError};
use crate::fields::{AflEntry, CardFields};
use crate::status::SW_TECHNICAL_PROBLEM;
use crate::transport::Transport;

/// Known EMV Application Identifiers (AIDs)
pub mod aids {
    /// PPSE (Proximity Payment System Environment)
    pub const PPSE: &[u8] = b"2PAY.SYS.DDF01";

    /// PSE (Payment System Environment)
    pub const PSE: &[u8] = b"1PAY.SYS.DDF01";

    /// Visa
    pub const VISA: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10];

    /// Mastercard
    pub const MASTERCARD: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10];

    /// American Express
    pub const AMEX: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x25, 0x01];

    /// Payment applications tried in order when no directory names one
    pub const KNOWN_AIDS: &[(&[u8], &str)] = &[
        (VISA, "Visa Credit/Debit"),
        (&[0xA0, 0x00, 0x00, 0x00, 0x03, 0x20, 0x10], "Visa Electron"),
        (&[0xA0, 0x00, 0x00, 0x00, 0x03, 0x20, 0x20], "V PAY"),
        (&[0xA0, 0x00, 0x00, 0x00, 0x03, 0x80, 0x10], "Visa Plus"),
        (MASTERCARD, "Mastercard"),
        (&[0xA0, 0x00, 0x00, 0x00, 0x04, 0x30, 0x60], "Maestro"),
        (&[0xA0, 0x00, 0x00, 0x00, 0x04, 0x60, 0x00], "Cirrus"),
        (AMEX, "American Express"),
        (&[0xA0, 0x00, 0x00, 0x01, 0x52, 0x30, 0x10], "Discover"),
        (&[0xA0, 0x00, 0x00, 0x00, 0x65, 0x10, 0x10], "JCB"),
        (&[0xA0, 0x00, 0x00, 0x03, 0x33, 0x01, 0x01, 0x01], "UnionPay Debit"),
        (&[0xA0, 0x00, 0x00, 0x03, 0x33, 0x01, 0x01, 0x02], "UnionPay Credit"),
        (&[0xA0, 0x00, 0x00, 0x06, 0x58, 0x10, 0x10], "MIR"),
        (&[0xA0, 0x00, 0x00, 0x02, 0x77, 0x10, 0x10], "Interac"),
        (&[0xA0, 0x00, 0x00, 0x05, 0x24, 0x10, 0x10], "RuPay"),
        (&[0xA0, 0x00, 0x00, 0x03, 0x24, 0x10, 0x10], "Discover ZIP"),
    ];

    /// Name of a known AID. Card AIDs may carry a suffix after the
    /// registered prefix, so the longest matching prefix wins.
    pub fn aid_name(aid: &[u8]) -> Option<&'static str> {
        KNOWN_AIDS
            .iter()
            .filter(|(known, _)| aid.starts_with(known))
            .max_by_key(|(known, _)| known.len())
            .map(|(_, name)| *name)
    }
}

/// An application listed in a PPSE/PSE directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationInfo {
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize")]
    pub aid: Vec<u8>,
    pub label: Option<String>,
    pub preferred_name: Option<String>,
    pub priority: Option<u8>,
}

impl ApplicationInfo {
    fn from_template(node: &TlvNode) -> Option<Self> {
        let aid = node.find(tags::APPLICATION_IDENTIFIER.bytes())?.value.clone();
        let text = |tag: &[u8]| {
            node.find(tag)
                .map(|n| String::from_utf8_lossy(&n.value).trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Some(Self {
            label: text(tags::APPLICATION_LABEL.bytes()),
            preferred_name: text(tags::APPLICATION_PREFERRED_NAME.bytes()),
            priority: node
                .find(tags::APPLICATION_PRIORITY_INDICATOR.bytes())
                .and_then(|n| n.value.first().copied()),
            aid,
        })
    }

    /// Best available name: preferred name, label, known-AID name, then hex
    pub fn display_name(&self) -> String {
        self.preferred_name
            .clone()
            .or_else(|| self.label.clone())
            .or_else(|| aids::aid_name(&self.aid).map(str::to_string))
            .unwrap_or_else(|| to_hex(&self.aid))
    }

    /// Priority rank (1 is highest; entries without a priority sort last)
    fn rank(&self) -> u8 {
        match self.priority.map(|p| p & 0x0F) {
            Some(p) if p > 0 => p,
            _ => 0x10,
        }
    }
}

/// Collect every Application Template (61) in a directory response
pub fn parse_directory(data: &[u8]) -> Vec<ApplicationInfo> {
    fn collect(nodes: &[TlvNode], apps: &mut Vec<ApplicationInfo>) {
        for node in nodes {
            if node.tag == tags::APPLICATION_TEMPLATE.bytes() {
                apps.extend(ApplicationInfo::from_template(node));
            } else {
                collect(&node.children, apps);
            }
        }
    }

    let mut apps = Vec::new();
    collect(&tlv::parse(data), &mut apps);
    apps
}

/// AIP and AFL from a GPO response in either format.
///
/// Format 1 (tag 80) is the AIP's two bytes followed directly by the AFL.
/// Format 2 (tag 77) carries them as tags 82 and 94.
pub fn parse_gpo_response(data: &[u8]) -> (Option<Aip>, Vec<AflEntry>) {
    if let Some(format1) = find_tag(data, tags::RESPONSE_MESSAGE_TEMPLATE_FORMAT_1.bytes()) {
        let afl = format1
            .get(2..)
            .map(AflEntry::parse_list)
            .unwrap_or_default();
        return (Aip::from_bytes(format1), afl);
    }

    let body = find_tag(data, tags::RESPONSE_MESSAGE_TEMPLATE_FORMAT_2.bytes()).unwrap_or(data);
    let aip = find_tag(body, tags::AIP.bytes()).and_then(Aip::from_bytes);
    let afl = find_tag(body, tags::AFL.bytes())
        .map(AflEntry::parse_list)
        .unwrap_or_default();
    (aip, afl)
}

/// Directory AIDs first, then the fixed table, without repeats
fn candidate_aids(directory: &[ApplicationInfo]) -> Vec<Vec<u8>> {
    let listed = directory.iter().map(|app| app.aid.clone());
    let known = aids::KNOWN_AIDS.iter().map(|(aid, _)| aid.to_vec());

    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for aid in listed.chain(known) {
        if !candidates.contains(&aid) {
            candidates.push(aid);
        }
    }
    candidates
}

/// One record read from the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordData {
    pub sfi: u8,
    pub record: u8,
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize")]
    pub data: Vec<u8>,
}

/// Everything learned during one discovery pass, including partial failures
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryResult {
    pub ppse_status: Option<String>,
    pub pse_status: Option<String>,
    pub directory: Vec<ApplicationInfo>,
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize_option")]
    pub selected_aid: Option<Vec<u8>>,
    pub application_name: Option<String>,
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize_option")]
    pub fci: Option<Vec<u8>>,
    pub aip: Option<Aip>,
    pub aip_capabilities: Vec<String>,
    pub pdol: Option<Dol>,
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize")]
    pub pdol_data: Vec<u8>,
    pub gpo_status: Option<String>,
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize_option")]
    pub gpo_response: Option<Vec<u8>>,
    pub afl: Vec<AflEntry>,
    pub records: Vec<RecordData>,
    pub cdol1: Option<Dol>,
    pub cdol2: Option<Dol>,
    pub tags: BTreeMap<String, String>,
    pub fields: CardFields,
    pub cvm: Option<CvmList>,
    pub notes: Vec<String>,
}

impl DiscoveryResult {
    /// Whether any payment application was selected
    pub fn is_selected(&self) -> bool {
        self.selected_aid.is_some()
    }
}

/// SELECT outcome that counts as "selected": 9000, or 61xx left over when
/// chaining hit its limit
fn is_selected(response: &ApduResponse) -> bool {
    response.is_success() || response.has_more_data()
}

/// EMV card interface
pub struct EmvCard<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    limits: ChainingLimits,
    brute_force_sfis: Vec<u8>,
    brute_force_records: u8,
}

impl<'t, T: Transport + ?Sized> EmvCard<'t, T> {
    /// Create a new EMV card interface with default session options
    pub fn new(transport: &'t mut T) -> Self {
        Self::with_config(transport, &SessionConfig::default())
    }

    /// Create a new EMV card interface
    pub fn with_config(transport: &'t mut T, config: &SessionConfig) -> Self {
        Self {
            transport,
            limits: config.chaining_limits(),
            brute_force_sfis: config.brute_force_sfis.clone(),
            brute_force_records: config.brute_force_records,
        }
    }

    /// Exchange with chaining. A lost card aborts; any other failure becomes
    /// a synthetic 6F00 so the caller can move on to the next step.
    fn transceive(&mut self, command: &ApduCommand) -> Result<ApduResponse> {
        match exchange_with_chaining(&mut *self.transport, command, self.limits) {
            Ok(response) => Ok(response),
            Err(Error::Transport(TransportError::Disconnected)) => {
                Err(TransportError::Disconnected.into())
            }
            Err(e) => {
                warn!(ins = command.ins(), error = %e, "Exchange failed, treating as 6F00");
                Ok(ApduResponse::status_only(SW_TECHNICAL_PROBLEM))
            }
        }
    }

    /// Select an EMV application by AID (or a directory by name)
    pub fn select(&mut self, aid: &[u8]) -> Result<ApduResponse> {
        let response = self.transceive(&commands::select(aid))?;
        debug!(aid = %to_hex(aid), sw = %response.status_string(), "SELECT");
        Ok(response)
    }

    /// Send GET PROCESSING OPTIONS with the given PDOL data
    pub fn get_processing_options(&mut self, pdol_data: &[u8]) -> Result<ApduResponse> {
        let response = self.transceive(&commands::get_processing_options(pdol_data))?;
        debug!(sw = %response.status_string(), "GET PROCESSING OPTIONS");
        Ok(response)
    }

    /// Read a single record from the card
    pub fn read_record(&mut self, record_number: u8, sfi: u8) -> Result<ApduResponse> {
        let response = self.transceive(&commands::read_record(record_number, sfi))?;
        debug!(sfi, record = record_number, sw = %response.status_string(), "READ RECORD");
        Ok(response)
    }

    /// GET DATA for a single data object
    pub fn get_data(&mut self, tag: &[u8]) -> Result<ApduResponse> {
        let response = self.transceive(&commands::get_data(tag))?;
        debug!(tag = %to_hex(tag), sw = %response.status_string(), "GET DATA");
        Ok(response)
    }

    /// Applications listed by the PPSE, or by the PSE when no PPSE answers
    pub fn list_applications(&mut self) -> Result<Vec<ApplicationInfo>> {
        let mut result = DiscoveryResult::default();
        self.select_directory(&mut result)?;
        Ok(result.directory)
    }

    fn select_directory(&mut self, result: &mut DiscoveryResult) -> Result<()> {
        let ppse = self.select(aids::PPSE)?;
        result.ppse_status = Some(ppse.status_string());
        if is_selected(&ppse) {
            result.directory = parse_directory(&ppse.data);
        } else {
            let pse = self.select(aids::PSE)?;
            result.pse_status = Some(pse.status_string());
            if is_selected(&pse) {
                result.directory = self.read_pse_directory(&pse.data)?;
            }
        }

        result.directory.sort_by_key(ApplicationInfo::rank);
        if !result.directory.is_empty() {
            info!(count = result.directory.len(), "Directory lists applications");
        }
        Ok(())
    }

    /// The contact PSE keeps its entries in records of the SFI named in the FCI
    fn read_pse_directory(&mut self, fci: &[u8]) -> Result<Vec<ApplicationInfo>> {
        let mut apps = parse_directory(fci);
        let sfi = find_node(&tlv::parse(fci), tags::SHORT_FILE_IDENTIFIER.bytes())
            .and_then(|n| n.value.first().copied());

        if let Some(sfi) = sfi {
            for record in 1..=self.brute_force_records.max(1) {
                let response = self.read_record(record, sfi)?;
                if !response.is_success() {
                    break;
                }
                apps.extend(parse_directory(&response.data));
            }
        }
        Ok(apps)
    }

    fn read_records(&mut self, result: &mut DiscoveryResult) -> Result<()> {
        if result.afl.is_empty() {
            info!("No AFL, probing records directly");
            let sfis = self.brute_force_sfis.clone();
            for sfi in sfis {
                for record in 1..=self.brute_force_records {
                    let response = self.read_record(record, sfi)?;
                    if !response.is_success() || response.data.is_empty() {
                        break;
                    }
                    Self::keep_record(result, sfi, record, response.data);
                }
            }
            return Ok(());
        }

        let afl = result.afl.clone();
        for entry in afl {
            for record in entry.records() {
                let response = self.read_record(record, entry.sfi)?;
                if response.is_success() && !response.data.is_empty() {
                    Self::keep_record(result, entry.sfi, record, response.data);
                } else {
                    result.notes.push(format!(
                        "SFI {} record {}: {}",
                        entry.sfi,
                        record,
                        response.status_description()
                    ));
                }
            }
        }
        Ok(())
    }

    fn keep_record(result: &mut DiscoveryResult, sfi: u8, record: u8, data: Vec<u8>) {
        flatten_into(&tlv::parse(&data), &mut result.tags);
        result.records.push(RecordData { sfi, record, data });
    }

    fn probe_counters(&mut self, result: &mut DiscoveryResult) -> Result<()> {
        for tag in [
            tags::APPLICATION_TRANSACTION_COUNTER,
            tags::PIN_TRY_COUNTER,
            tags::LAST_ONLINE_ATC,
        ] {
            let response = self.get_data(tag.bytes())?;
            if response.is_success() {
                let value = find_tag(&response.data, tag.bytes()).unwrap_or(&response.data);
                result.tags.insert(to_hex(tag.bytes()), to_hex(value));
            }
        }
        Ok(())
    }

    /// Run the full discovery sequence.
    ///
    /// Only a lost card is returned as an error. Every other failure is noted
    /// in the result and discovery continues with what it has.
    pub fn discover(&mut self) -> Result<DiscoveryResult> {
        let mut result = DiscoveryResult::default();
        self.select_directory(&mut result)?;

        let mut selection = None;
        for aid in candidate_aids(&result.directory) {
            let response = self.select(&aid)?;
            if is_selected(&response) {
                selection = Some((aid, response));
                break;
            }
        }

        let Some((aid, fci)) = selection else {
            warn!("No payment application could be selected");
            result
                .notes
                .push("No payment application could be selected".to_string());
            return Ok(result);
        };

        let name = aids::aid_name(&aid).map(str::to_string).or_else(|| {
            result
                .directory
                .iter()
                .find(|app| app.aid == aid)
                .map(ApplicationInfo::display_name)
        });
        info!(aid = %to_hex(&aid), name = name.as_deref().unwrap_or("unknown"), "Application selected");
        result.application_name = name;
        result.selected_aid = Some(aid);

        let fci_nodes = tlv::parse(&fci.data);
        let mut aip = find_node(&fci_nodes, tags::AIP.bytes()).and_then(|n| Aip::from_bytes(&n.value));
        let pdol = find_node(&fci_nodes, tags::PDOL.bytes()).map(|n| Dol::parse(&n.value));
        flatten_into(&fci_nodes, &mut result.tags);
        result.fci = Some(fci.data);

        result.pdol_data = pdol.as_ref().map(Dol::default_data).unwrap_or_default();
        result.pdol = pdol;

        let gpo = self.get_processing_options(&result.pdol_data)?;
        result.gpo_status = Some(gpo.status_string());
        if gpo.is_success() {
            let (gpo_aip, afl) = parse_gpo_response(&gpo.data);
            if gpo_aip.is_some() {
                aip = gpo_aip;
            }
            result.afl = afl;
            flatten_into(&tlv::parse(&gpo.data), &mut result.tags);
            result.gpo_response = Some(gpo.data);
        } else {
            result
                .notes
                .push(format!("GET PROCESSING OPTIONS: {}", gpo.status_description()));
        }

        result.aip_capabilities = aip.map(|a| a.describe()).unwrap_or_default();
        result.aip = aip;

        self.read_records(&mut result)?;
        self.probe_counters(&mut result)?;

        let dol = |map: &BTreeMap<String, String>, tag: &str| {
            map.get(tag)
                .and_then(|v| hex::decode(v).ok())
                .map(|bytes| Dol::parse(&bytes))
        };
        result.cdol1 = dol(&result.tags, "8C");
        result.cdol2 = dol(&result.tags, "8D");
        result.cvm = result
            .tags
            .get("8E")
            .and_then(|v| hex::decode(v).ok())
            .and_then(|bytes| CvmList::parse(&bytes));
        result.fields = CardFields::from_tags(&result.tags, &mut result.notes);

        if result.fields.pan.is_none() {
            result.notes.push("No PAN recovered".to_string());
        }
        info!(
            records = result.records.len(),
            pan = result.fields.pan.is_some(),
            "Discovery finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aids() {
        assert_eq!(aids::VISA.len(), 7);
        assert_eq!(aids::PPSE, b"2PAY.SYS.DDF01");
        assert_eq!(aids::PSE, b"1PAY.SYS.DDF01");
        assert_eq!(aids::aid_name(aids::VISA), Some("Visa Credit/Debit"));
        assert_eq!(aids::aid_name(&[0xA0, 0x00, 0x00, 0x00, 0x25, 0x01, 0x04, 0x01]), Some("American Express"));
        assert_eq!(aids::aid_name(&[0xA0, 0x00, 0x00, 0x00, 0x99]), None);
    }

    #[test]
    fn test_known_aids_unique() {
        for (i, (a, _)) in aids::KNOWN_AIDS.iter().enumerate() {
            assert!(aids::KNOWN_AIDS[i + 1..].iter().all(|(b, _)| a != b));
        }
    }

    #[test]
    fn test_parse_ppse_directory() {
        // 6F { 84 "2PAY.SYS.DDF01", A5 { BF0C { 61 { 4F A0000000041010, 50 "MC", 87 01 } } } }
        let fci = hex::decode(
            "6F27840E325041592E5359532E4444463031A515BF0C1261104F07A000000004101050024D43870101",
        )
        .unwrap();
        let apps = parse_directory(&fci);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].aid, aids::MASTERCARD);
        assert_eq!(apps[0].label.as_deref(), Some("MC"));
        assert_eq!(apps[0].priority, Some(1));
        assert_eq!(apps[0].display_name(), "MC");
    }

    #[test]
    fn test_gpo_format1_afl_follows_aip() {
        // 80 { AIP 1980, AFL 08010100 10010200 }
        let data = hex::decode("800A19800801010010010200").unwrap();
        let (aip, afl) = parse_gpo_response(&data);
        assert_eq!(aip.unwrap().bytes, [0x19, 0x80]);
        assert_eq!(afl.len(), 2);
        assert_eq!(afl[0].sfi, 1);
        assert_eq!(afl[1].sfi, 2);
        assert_eq!(afl[1].last_record, 2);
    }

    #[test]
    fn test_gpo_format2() {
        // 77 { 82 2000, 94 18010100 }
        let data = hex::decode("770A82022000940418010100").unwrap();
        let (aip, afl) = parse_gpo_response(&data);
        assert_eq!(aip.unwrap().bytes, [0x20, 0x00]);
        assert_eq!(afl, vec![AflEntry { sfi: 3, first_record: 1, last_record: 1, offline_auth_records: 0 }]);
    }

    #[test]
    fn test_candidates_put_directory_first() {
        let directory = vec![ApplicationInfo {
            aid: aids::MASTERCARD.to_vec(),
            label: None,
            preferred_name: None,
            priority: None,
        }];
        let candidates = candidate_aids(&directory);
        assert_eq!(candidates[0], aids::MASTERCARD);
        assert_eq!(candidates[1], aids::VISA);
        assert_eq!(candidates.len(), aids::KNOWN_AIDS.len());
    }
}
