use super::*;
use crate::m95x::{M95x, M95xConfig};
use crate::sim::m95x::EepromModel;
use crate::sim::sdcard::{CardKind, SdModel, CRC_REJECTED, WRITE_FAILED};
use crate::sim::{Bench, SimBus};
use busline_core::PollTimeout;
use busline_hal_sim::{SimEvent, SimPin};
use busline_protocol::command::ACMD41_HCS;
use busline_protocol::{CardStatusError, BLOCK_LEN};
use std::cell::RefCell;
use std::rc::Rc;

type Card<'b> = SdCard<'b, SimBus, SimPin, PollTimeout>;

fn card_with(bench: &Bench, model: SdModel, config: SdCardConfig) -> (Rc<RefCell<SdModel>>, Card<'_>) {
    let model = Rc::new(RefCell::new(model));
    let cs = bench.hw.attach(model.clone());
    let card = SdCard::new(&bench.bus, TransferId(3), cs, PollTimeout::new(10), config);
    (model, card)
}

fn card(bench: &Bench, kind: CardKind) -> (Rc<RefCell<SdModel>>, Card<'_>) {
    card_with(bench, SdModel::new(kind).with_pattern(), SdCardConfig::default())
}

fn ready(bench: &Bench, kind: CardKind) -> (Rc<RefCell<SdModel>>, Card<'_>) {
    let (model, card) = card(bench, kind);
    card.init_card().unwrap();
    (model, card)
}

#[test]
fn test_init_detects_card_types() {
    let cases = [
        (CardKind::Mmc, CardType::Mmc, 2048, 16384),
        (CardKind::SdV1, CardType::SdscV1, 2048, 16384),
        (CardKind::SdV2Sc, CardType::SdscV2, 2048, 16384),
        (CardKind::SdHc, CardType::SdhcSdxc, 1024, 512),
    ];
    for (kind, expected, sectors, erase) in cases {
        let bench = Bench::new();
        let (model, card) = card(&bench, kind);

        assert_eq!(card.card_type(), CardType::Unknown);
        assert_eq!(card.init_card(), Ok(expected));
        assert!(card.is_initialized());
        assert_eq!(card.sectors_count(), sectors);
        assert_eq!(card.erase_block_size(), erase);
        assert_eq!(card.block_len(), 512);
        assert_eq!(card.cid().map(|cid| cid.product_name()), Some(*b"BSIM1"));
        assert!(card.csd().is_some());

        let model = model.borrow();
        let set_blocklen = model.indices().contains(&busline_protocol::command::cmd::SET_BLOCKLEN);
        assert_eq!(set_blocklen, kind != CardKind::SdHc);
    }
}

#[test]
fn test_version_1_cards_never_request_high_capacity() {
    for kind in [CardKind::SdV1, CardKind::Mmc] {
        let bench = Bench::new();
        let (model, _card) = ready(&bench, kind);
        let model = model.borrow();
        assert!(model.op_cond_args.iter().all(|&arg| arg & ACMD41_HCS == 0));
    }

    let bench = Bench::new();
    let (model, _card) = ready(&bench, CardKind::Mmc);
    // CMD1 loop after the refused APP_CMD
    assert!(model.borrow().indices().contains(&1));

    let bench = Bench::new();
    let (model, _card) = ready(&bench, CardKind::SdV2Sc);
    assert!(model.borrow().op_cond_args.iter().all(|&arg| arg & ACMD41_HCS != 0));
}

#[test]
fn test_init_runs_at_low_speed_and_restores() {
    let bench = Bench::new();
    let (_model, card) = card(&bench, CardKind::SdHc);
    bench.hw.clear_events();

    card.init_card().unwrap();

    let rates: Vec<_> = bench
        .hw
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SimEvent::BaudRate(rate) => Some(rate),
            _ => None,
        })
        .collect();
    assert_eq!(rates, vec![BaudRate::Div256, BaudRate::Div4]);
}

#[test]
fn test_cid_crc_rejected() {
    let bench = Bench::new();
    let mut model = SdModel::new(CardKind::SdV2Sc);
    model.corrupt_cid = true;
    let (_model, card) = card_with(&bench, model, SdCardConfig::default());

    assert_eq!(card.init_card(), Err(Error::Crc));
    assert!(!card.is_initialized());
    assert_eq!(card.card_type(), CardType::Unknown);
    // Deselected and back at full speed
    assert_eq!(bench.hw.baud_rate(), Some(BaudRate::Div4));
    assert!(matches!(
        bench.hw.events().iter().rev().find(|e| matches!(e, SimEvent::Select { .. })),
        Some(SimEvent::Select { selected: false, .. })
    ));
}

#[test]
fn test_check_pattern_mismatch_unusable() {
    let bench = Bench::new();
    let mut model = SdModel::new(CardKind::SdHc);
    model.wrong_pattern = true;
    let (_model, card) = card_with(&bench, model, SdCardConfig::default());

    assert_eq!(card.init_card(), Err(Error::UnusableCard));
    assert_eq!(bench.hw.baud_rate(), Some(BaudRate::Div4));
}

#[test]
fn test_mmc_csd_structure_versions() {
    for structure in [0, 1, 2, 3] {
        let bench = Bench::new();
        let mut model = SdModel::new(CardKind::Mmc);
        model.csd_structure = Some(structure);
        let (_model, card) = card_with(&bench, model, SdCardConfig::default());

        assert_eq!(card.init_card(), Ok(CardType::Mmc));
        assert_eq!(card.sectors_count(), 2048);
        assert_eq!(card.erase_block_size(), 16384);
    }

    // SD cards only define structures 0 and 1
    let bench = Bench::new();
    let mut model = SdModel::new(CardKind::SdV2Sc);
    model.csd_structure = Some(2);
    let (_model, card) = card_with(&bench, model, SdCardConfig::default());
    assert_eq!(card.init_card(), Err(Error::UnusableCard));
    assert!(!card.is_initialized());
}

#[test]
fn test_power_up_timeout() {
    let bench = Bench::new();
    let mut model = SdModel::new(CardKind::SdHc);
    model.init_polls = u32::MAX;
    let config = SdCardConfig {
        init_timeout_ms: 5,
        ..SdCardConfig::default()
    };
    let (_model, card) = card_with(&bench, model, config);

    assert_eq!(card.init_card(), Err(Error::Timeout));
    assert!(!card.is_initialized());
}

#[test]
fn test_operations_require_init() {
    let bench = Bench::new();
    let (_model, card) = card(&bench, CardKind::SdHc);

    let mut block = [0u8; BLOCK_LEN];
    assert_eq!(card.read_single_data_block(0, &mut block), Err(Error::NotInitialized));
    assert_eq!(card.write_single_data_block(0, &block), Err(Error::NotInitialized));
    assert_eq!(card.read_status(), Err(Error::NotInitialized));
    assert!(bench.hw.events().is_empty());
}

#[test]
fn test_invalid_block_arguments() {
    let bench = Bench::new();
    let (_model, card) = ready(&bench, CardKind::SdHc);

    let mut short = [0u8; 100];
    assert_eq!(card.read_single_data_block(0, &mut short), Err(Error::InvalidArgument));
    let mut two = vec![0u8; 2 * BLOCK_LEN];
    assert_eq!(card.read_multiple_data_block(1023, &mut two), Err(Error::InvalidArgument));
    assert_eq!(card.erase(5, 2), Err(Error::InvalidArgument));
}

#[test]
fn test_single_block_byte_addressed() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::SdV2Sc);

    let data: Vec<u8> = (0..BLOCK_LEN).map(|i| (i * 7) as u8).collect();
    card.write_single_data_block(3, &data).unwrap();
    assert_eq!(model.borrow().sector(3), data.as_slice());

    let mut back = [0u8; BLOCK_LEN];
    card.read_single_data_block(3, &mut back).unwrap();
    assert_eq!(back.as_slice(), data.as_slice());

    let model = model.borrow();
    assert!(model.commands.contains(&(24, 3 * 512)));
    assert!(model.commands.contains(&(17, 3 * 512)));
}

#[test]
fn test_single_block_sector_addressed() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::SdHc);

    let mut block = [0u8; BLOCK_LEN];
    card.read_single_data_block(5, &mut block).unwrap();
    assert_eq!(block.as_slice(), model.borrow().sector(5));
    assert!(model.borrow().commands.contains(&(17, 5)));
}

#[test]
fn test_multi_block_read_to_last_sector() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::SdHc);

    let count = card.sectors_count() as usize;
    let mut buf = vec![0u8; count * BLOCK_LEN];
    assert_eq!(card.read_multiple_data_block(0, &mut buf), Ok(()));
    assert_eq!(buf, model.borrow().storage);

    let indices = model.borrow().indices();
    assert_eq!(indices[indices.len() - 3..], [18, 12, 13]);
}

#[test]
fn test_multi_block_out_of_range_before_end() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::SdHc);
    model.borrow_mut().out_of_range_pending = true;

    let mut buf = vec![0u8; 2 * BLOCK_LEN];
    assert_eq!(
        card.read_multiple_data_block(0, &mut buf),
        Err(Error::Card(CardStatusError::OutOfRange))
    );
}

#[test]
fn test_data_response_errors() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::SdHc);
    let data = [0xA5u8; BLOCK_LEN];

    model.borrow_mut().data_response = Some(CRC_REJECTED);
    assert_eq!(card.write_single_data_block(1, &data), Err(Error::Crc));

    model.borrow_mut().data_response = Some(WRITE_FAILED);
    assert_eq!(card.write_single_data_block(1, &data), Err(Error::Write));

    assert_ne!(model.borrow().sector(1), data.as_slice());
    card.write_single_data_block(1, &data).unwrap();
    assert_eq!(model.borrow().sector(1), data.as_slice());
}

#[test]
fn test_multi_block_write_pre_erase_count() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::SdV2Sc);

    let data: Vec<u8> = (0..3 * BLOCK_LEN).map(|i| (i % 253) as u8).collect();
    card.write_multiple_data_block(10, &data).unwrap();

    let model = model.borrow();
    assert_eq!(&model.storage[10 * BLOCK_LEN..13 * BLOCK_LEN], data.as_slice());
    assert!(model.commands.contains(&(23 | 0x80, 3)));
    assert!(model.commands.contains(&(25, 10 * 512)));
    assert_eq!(model.indices().last(), Some(&13));
}

#[test]
fn test_mmc_multi_block_write_without_pre_erase() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::Mmc);

    let data = vec![0x3Cu8; 2 * BLOCK_LEN];
    card.write_multiple_data_block(0, &data).unwrap();

    let model = model.borrow();
    assert!(!model.indices().contains(&(23 | 0x80)));
    assert_eq!(&model.storage[..2 * BLOCK_LEN], data.as_slice());
}

#[test]
fn test_block_crc_checked_when_enabled() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::SdHc);
    model.borrow_mut().corrupt_read_crc = true;

    let mut block = [0u8; BLOCK_LEN];
    card.read_single_data_block(0, &mut block).unwrap();

    card.set_crc_enabled(true).unwrap();
    assert!(card.crc_enabled());
    assert!(model.borrow().crc_on);
    assert_eq!(card.read_single_data_block(0, &mut block), Err(Error::Crc));

    card.set_crc_enabled(false).unwrap();
    assert!(!model.borrow().crc_on);
    card.read_single_data_block(0, &mut block).unwrap();
}

#[test]
fn test_crc_setting_survives_reinit() {
    let bench = Bench::new();
    let config = SdCardConfig {
        crc: true,
        ..SdCardConfig::default()
    };
    let (model, card) = card_with(&bench, SdModel::new(CardKind::SdV2Sc), config);

    card.init_card().unwrap();
    assert!(card.crc_enabled());
    assert!(model.borrow().crc_on);

    // CMD0 switches CRC off in the card; init turns it back on
    card.init_card().unwrap();
    assert!(model.borrow().crc_on);

    let data = [0x42u8; BLOCK_LEN];
    card.write_single_data_block(7, &data).unwrap();
    let mut back = [0u8; BLOCK_LEN];
    card.read_single_data_block(7, &mut back).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_erase_per_card_family() {
    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::SdHc);
    card.erase(2, 5).unwrap();
    {
        let model = model.borrow();
        assert!(model.storage[2 * BLOCK_LEN..6 * BLOCK_LEN].iter().all(|&b| b == 0xFF));
        assert_eq!(model.indices()[model.indices().len() - 3..], [32, 33, 38]);
    }

    let bench = Bench::new();
    let (model, card) = ready(&bench, CardKind::Mmc);
    card.erase(0, 0).unwrap();
    let model = model.borrow();
    assert!(model.storage[..BLOCK_LEN].iter().all(|&b| b == 0xFF));
    assert_eq!(model.indices()[model.indices().len() - 3..], [35, 36, 38]);
}

#[test]
fn test_read_status() {
    let bench = Bench::new();
    let (_model, card) = ready(&bench, CardKind::SdV1);
    assert_eq!(card.read_status(), Ok(busline_protocol::R2Status(0)));
}

#[test]
fn test_bus_shared_with_eeprom() {
    let bench = Bench::new();
    let eeprom_model = Rc::new(RefCell::new(EepromModel::new(1024, 64, 2)));
    eeprom_model.borrow_mut().memory[..2].copy_from_slice(&[0x12, 0x34]);
    let eeprom = M95x::new(
        &bench.bus,
        TransferId(1),
        bench.hw.attach(eeprom_model.clone()),
        M95xConfig::default(),
    );
    let (model, card) = ready(&bench, CardKind::SdHc);

    let mut word = [0u8; 2];
    unsafe { eeprom.begin_read(0, &mut word) }.unwrap();

    let mut block = [0u8; BLOCK_LEN];
    assert_eq!(card.read_single_data_block(0, &mut block), Err(Error::Busy));
    assert_eq!(card.init_card(), Err(Error::Busy));

    let listeners: [&dyn TransferListener; 2] = [&card, &eeprom];
    bench.bus.dma_rx_irq_handler(&listeners);
    bench.bus.dma_rx_irq_handler(&listeners);
    assert_eq!(eeprom.future().result(), Some(Ok(())));
    assert_eq!(word, [0x12, 0x34]);

    card.read_single_data_block(0, &mut block).unwrap();
    assert_eq!(block.as_slice(), model.borrow().sector(0));
}
