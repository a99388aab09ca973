// Synthetic archives and experiment documents for the unit tests.
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::fmt::Write as _;
use std::io::Write;

use crate::container::{ZipCryptoKeys, ENCRYPTION_HEADER_SIZE};
use crate::protocol::{resolve_protocol, ProtocolStep, StepKind};

pub(crate) const ENTRY_NAME: &str = "experiment.xml";
const MOD_TIME: u16 = 0x6B2A;
const MOD_DATE: u16 = 0x5A21;

pub(crate) struct SealOptions {
    pub encrypt: bool,
    pub deflate: bool,
    pub data_descriptor: bool,
    pub declared_entries: u16,
}

impl Default for SealOptions {
    fn default() -> Self {
        Self {
            encrypt: true,
            deflate: false,
            data_descriptor: false,
            declared_entries: 1,
        }
    }
}

/// Wrap a document in a single-entry archive the way the instrument software does
pub(crate) fn seal_document(document: &[u8], secret: &str, options: &SealOptions) -> Vec<u8> {
    let mut crc = flate2::Crc::new();
    crc.update(document);
    let crc32 = crc.sum();

    let mut data = if options.deflate {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(document).unwrap();
        encoder.finish().unwrap()
    } else {
        document.to_vec()
    };

    let mut flags = 0u16;
    if options.data_descriptor {
        flags |= 0x0008;
    }
    if options.encrypt {
        flags |= 0x0001;
        let check = if options.data_descriptor {
            (MOD_TIME >> 8) as u8
        } else {
            (crc32 >> 24) as u8
        };
        let mut header: Vec<u8> = (0..ENCRYPTION_HEADER_SIZE as u8 - 1)
            .map(|b| b.wrapping_mul(37).wrapping_add(11))
            .collect();
        header.push(check);
        let mut keys = ZipCryptoKeys::new(secret.as_bytes());
        data = header
            .iter()
            .chain(data.iter())
            .map(|b| keys.encrypt_byte(*b))
            .collect();
    }
    let method: u16 = if options.deflate { 8 } else { 0 };
    let compressed_size = data.len() as u32;
    let uncompressed_size = document.len() as u32;

    let mut archive: Vec<u8> = Vec::new();
    archive.write_u32::<LittleEndian>(0x04034b50).unwrap();
    archive.write_u16::<LittleEndian>(20).unwrap();
    archive.write_u16::<LittleEndian>(flags).unwrap();
    archive.write_u16::<LittleEndian>(method).unwrap();
    archive.write_u16::<LittleEndian>(MOD_TIME).unwrap();
    archive.write_u16::<LittleEndian>(MOD_DATE).unwrap();
    if options.data_descriptor {
        archive.write_all(&[0u8; 12]).unwrap();
    } else {
        archive.write_u32::<LittleEndian>(crc32).unwrap();
        archive.write_u32::<LittleEndian>(compressed_size).unwrap();
        archive.write_u32::<LittleEndian>(uncompressed_size).unwrap();
    }
    archive.write_u16::<LittleEndian>(ENTRY_NAME.len() as u16).unwrap();
    archive.write_u16::<LittleEndian>(0).unwrap();
    archive.write_all(ENTRY_NAME.as_bytes()).unwrap();
    archive.write_all(&data).unwrap();
    if options.data_descriptor {
        archive.write_u32::<LittleEndian>(0x08074b50).unwrap();
        archive.write_u32::<LittleEndian>(crc32).unwrap();
        archive.write_u32::<LittleEndian>(compressed_size).unwrap();
        archive.write_u32::<LittleEndian>(uncompressed_size).unwrap();
    }

    let directory_offset = archive.len() as u32;
    archive.write_u32::<LittleEndian>(0x02014b50).unwrap();
    archive.write_u16::<LittleEndian>(20).unwrap();
    archive.write_u16::<LittleEndian>(20).unwrap();
    archive.write_u16::<LittleEndian>(flags).unwrap();
    archive.write_u16::<LittleEndian>(method).unwrap();
    archive.write_u16::<LittleEndian>(MOD_TIME).unwrap();
    archive.write_u16::<LittleEndian>(MOD_DATE).unwrap();
    archive.write_u32::<LittleEndian>(crc32).unwrap();
    archive.write_u32::<LittleEndian>(compressed_size).unwrap();
    archive.write_u32::<LittleEndian>(uncompressed_size).unwrap();
    archive.write_u16::<LittleEndian>(ENTRY_NAME.len() as u16).unwrap();
    archive.write_u16::<LittleEndian>(0).unwrap(); // extra
    archive.write_u16::<LittleEndian>(0).unwrap(); // comment
    archive.write_u16::<LittleEndian>(0).unwrap(); // disk start
    archive.write_u16::<LittleEndian>(0).unwrap(); // internal attributes
    archive.write_u32::<LittleEndian>(0).unwrap(); // external attributes
    archive.write_u32::<LittleEndian>(0).unwrap(); // local header offset
    archive.write_all(ENTRY_NAME.as_bytes()).unwrap();
    let directory_size = archive.len() as u32 - directory_offset;

    archive.write_u32::<LittleEndian>(0x06054b50).unwrap();
    archive.write_u16::<LittleEndian>(0).unwrap();
    archive.write_u16::<LittleEndian>(0).unwrap();
    archive.write_u16::<LittleEndian>(options.declared_entries).unwrap();
    archive.write_u16::<LittleEndian>(options.declared_entries).unwrap();
    archive.write_u32::<LittleEndian>(directory_size).unwrap();
    archive.write_u32::<LittleEndian>(directory_offset).unwrap();
    archive.write_u16::<LittleEndian>(0).unwrap();
    archive
}

/// Pre-read, a 10 cycle touchdown loop reading at the annealing step, a 13 cycle loop
/// reading at the annealing step, post-read. Resolves to 25 acquisition events.
pub(crate) fn worked_example_steps() -> Vec<ProtocolStep> {
    let temperature = |index, temperature, acquires, increment| ProtocolStep {
        index,
        kind: StepKind::Temperature {
            temperature,
            hold_seconds: 30,
            acquires,
            increment,
        },
    };
    let goto = |index, target, repeats| ProtocolStep {
        index,
        kind: StepKind::Goto { target, repeats },
    };
    vec![
        temperature(0, 30.0, true, None),
        temperature(1, 95.0, false, None),
        temperature(2, 94.0, false, None),
        temperature(3, 61.0, true, Some(-0.6)),
        goto(4, 2, 9),
        temperature(5, 94.0, false, None),
        temperature(6, 55.0, true, None),
        goto(7, 5, 12),
        temperature(8, 30.0, true, None),
    ]
}

/// The mean written for a channel/position in the plate read of the given cycle.
/// Statistics are mean, mean / 100, mean - 5, mean + 5.
pub(crate) fn fixture_mean(channel: usize, position: usize, cycle: u32) -> f64 {
    1000.0 * (channel as f64 + 1.0) + position as f64 + 10.0 * cycle as f64
}

/// An experiment document with FAM on channel 0, HEX on channel 1 and ROX on channel 4 of a six
/// channel read, reads carrying a ninth reference row
pub(crate) struct DocumentFixture {
    pub rows: usize,
    pub columns: usize,
    /// (plate index, sample type, sample id)
    pub wells: Vec<(usize, &'static str, &'static str)>,
    pub dyes: Vec<(&'static str, i64)>,
    pub steps: Vec<ProtocolStep>,
    pub channels: usize,
    pub read_rows: usize,
    /// Drop this many reads from the end of the run
    pub missing_reads: usize,
    pub calibration_tag: String,
}

impl Default for DocumentFixture {
    fn default() -> Self {
        Self {
            rows: 8,
            columns: 12,
            wells: vec![
                (0, "wcSample", "S1"),
                (1, "wcNTC", "NTC"),
                (14, "wcPostiveControl", "PC"),
                (95, "wcSample", "S96"),
            ],
            dyes: vec![("FAM", 0), ("HEX", 1), ("ROX", 4)],
            steps: worked_example_steps(),
            channels: 6,
            read_rows: 9,
            missing_reads: 0,
            calibration_tag: "Pure_Dye0_PlateBRWhite_T60".to_string(),
        }
    }
}

impl DocumentFixture {
    fn payload(&self, cycle: u32) -> String {
        let positions = self.read_rows * self.columns;
        let mut payload = String::new();
        for channel in 0..self.channels {
            for position in 0..positions {
                let mean = fixture_mean(channel, position, cycle);
                for value in [mean, mean / 100.0, mean - 5.0, mean + 5.0] {
                    write!(payload, "{value};").unwrap();
                }
            }
        }
        payload
    }

    fn write_plate_setup(&self, xml: &mut String) {
        write!(
            xml,
            "<plateSetup2 rows=\"{}\" columns=\"{}\"><dyeLayersList>",
            self.rows, self.columns
        )
        .unwrap();
        for (layer, (dye, channel)) in self.dyes.iter().enumerate() {
            write!(
                xml,
                "<dyeLayer plateName=\"{dye}\"><fluor channelPosition=\"{channel}\"/><wellSamples>"
            )
            .unwrap();
            for (index, sample_type, name) in self.wells.iter() {
                // Later layers repeat the wells without the sample metadata
                let (sample_type, name) = if layer == 0 {
                    (*sample_type, *name)
                } else {
                    ("", "")
                };
                write!(
                    xml,
                    "<wellSample plateIndex=\"{index}\" wellSampleType=\"{sample_type}\" sampleId=\"{name}\"/>"
                )
                .unwrap();
            }
            xml.push_str("</wellSamples></dyeLayer>");
        }
        xml.push_str("</dyeLayersList></plateSetup2>");
    }

    fn write_protocol(&self, xml: &mut String) {
        xml.push_str("<protocol2BaseList>");
        for step in self.steps.iter() {
            match &step.kind {
                StepKind::Temperature {
                    temperature,
                    hold_seconds,
                    acquires,
                    increment,
                } => {
                    write!(
                        xml,
                        "<TemperatureStep temperatureStepTemp=\"{temperature}\" temperatureStepHoldTime=\"{hold_seconds}\">"
                    )
                    .unwrap();
                    if *acquires {
                        xml.push_str("<PlateReadOption/>");
                    }
                    if let Some(inc) = increment {
                        write!(
                            xml,
                            "<IncrementOption optionTemperatureIncrement=\"{inc}\"/>"
                        )
                        .unwrap();
                    }
                    xml.push_str("</TemperatureStep>");
                }
                StepKind::Goto { target, repeats } => {
                    write!(
                        xml,
                        "<GotoStep optionGotoStep=\"{target}\" optionGotoCycle=\"{repeats}\"/>"
                    )
                    .unwrap();
                }
            }
        }
        xml.push_str("</protocol2BaseList>");
    }

    fn write_run_data(&self, xml: &mut String) {
        let events = resolve_protocol(&self.steps, usize::MAX).unwrap();
        let kept = events.len().saturating_sub(self.missing_reads);
        xml.push_str("<runData><plateReadDataVector>");
        for event in events.iter().take(kept) {
            write!(
                xml,
                "<plateRead><PlateRead><Hdr><PlateReadDataHeader><Step>{}</Step><Cycle>{}</Cycle><ChCount>{}</ChCount><NumRows>{}</NumRows><NumCols>{}</NumCols></PlateReadDataHeader></Hdr><Data><PAr>{}</PAr></Data></PlateRead></plateRead>",
                event.step + 1,
                event.cycle,
                self.channels,
                self.read_rows,
                self.columns,
                self.payload(event.cycle)
            )
            .unwrap();
        }
        xml.push_str("</plateReadDataVector><calibrationDataVector>");
        let positions = self.read_rows * self.columns;
        let calibration: String = (0..self.channels * positions)
            .map(|v| format!("{v};"))
            .collect();
        write!(
            xml,
            "<calibration tag=\"{}\" chCount=\"{}\" numRows=\"{}\" numCols=\"{}\"><PAr>{calibration}</PAr></calibration>",
            self.calibration_tag, self.channels, self.read_rows, self.columns
        )
        .unwrap();
        xml.push_str("</calibrationDataVector></runData>");
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><experimentalData2>");
        self.write_plate_setup(&mut xml);
        self.write_protocol(&mut xml);
        self.write_run_data(&mut xml);
        xml.push_str("</experimentalData2>");
        xml
    }

    pub fn to_archive(&self, secret: &str) -> Vec<u8> {
        seal_document(
            self.to_xml().as_bytes(),
            secret,
            &SealOptions {
                deflate: true,
                ..Default::default()
            },
        )
    }
}
