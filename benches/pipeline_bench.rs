use criterion::{Criterion, black_box, criterion_group, criterion_main};

use fatturapa::core::PipelineConfig;
use fatturapa::{mapping, parser, pipeline, sanitize};

fn build_invoice(lines: usize) -> String {
    let mut body_lines = String::new();
    for i in 1..=lines {
        body_lines.push_str(&format!(
            concat!(
                "<DettaglioLinee><NumeroLinea>{i}</NumeroLinea>",
                "<Descrizione>Voce {i}</Descrizione><Quantita>1.00</Quantita>",
                "<PrezzoUnitario>10.00</PrezzoUnitario><PrezzoTotale>10.00</PrezzoTotale>",
                "<AliquotaIVA>22.00</AliquotaIVA></DettaglioLinee>",
            ),
            i = i
        ));
    }
    let taxable = 10 * lines;
    let vat = taxable * 22 / 100;
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
            "<p:FatturaElettronica versione=\"FPR12\" xmlns:p=\"urn:fatturapa\">",
            "<FatturaElettronicaHeader><DatiTrasmissione>",
            "<IdTrasmittente><IdPaese>IT</IdPaese><IdCodice>01234567890</IdCodice></IdTrasmittente>",
            "<ProgressivoInvio>00001</ProgressivoInvio>",
            "<FormatoTrasmissione>FPR12</FormatoTrasmissione>",
            "<CodiceDestinatario>ABC1234</CodiceDestinatario></DatiTrasmissione>",
            "<CedentePrestatore><DatiAnagrafici>",
            "<IdFiscaleIVA><IdPaese>IT</IdPaese><IdCodice>01234567890</IdCodice></IdFiscaleIVA>",
            "<Anagrafica><Denominazione>Bench Srl</Denominazione></Anagrafica>",
            "</DatiAnagrafici></CedentePrestatore>",
            "</FatturaElettronicaHeader>",
            "<FatturaElettronicaBody><DatiGenerali><DatiGeneraliDocumento>",
            "<TipoDocumento>TD01</TipoDocumento><Divisa>EUR</Divisa>",
            "<Data>2024-06-15</Data><Numero>BENCH-1</Numero>",
            "<ImportoTotaleDocumento>{total}.00</ImportoTotaleDocumento>",
            "</DatiGeneraliDocumento></DatiGenerali>",
            "<DatiBeniServizi>{lines}",
            "<DatiRiepilogo><AliquotaIVA>22.00</AliquotaIVA>",
            "<ImponibileImporto>{taxable}.00</ImponibileImporto><Imposta>{vat}.00</Imposta>",
            "</DatiRiepilogo></DatiBeniServizi>",
            "</FatturaElettronicaBody></p:FatturaElettronica>",
        ),
        total = taxable + vat,
        lines = body_lines,
        taxable = taxable,
        vat = vat
    )
}

fn bench_sanitize(c: &mut Criterion) {
    let xml = build_invoice(50);
    c.bench_function("sanitize_clean_50_lines", |b| {
        b.iter(|| sanitize::sanitize(black_box(xml.as_bytes())))
    });
}

fn bench_parse(c: &mut Criterion) {
    let xml = build_invoice(50);
    c.bench_function("parse_strict_50_lines", |b| {
        b.iter(|| parser::parse(black_box(&xml)).unwrap())
    });

    // Prefixed inner elements force the lenient tier.
    let prefixed = xml
        .replace("<FatturaElettronicaBody>", "<ns2:FatturaElettronicaBody>")
        .replace("</FatturaElettronicaBody>", "</ns2:FatturaElettronicaBody>")
        .replace("<Dati", "<ns2:Dati")
        .replace("</Dati", "</ns2:Dati");
    c.bench_function("parse_lenient_50_lines", |b| {
        b.iter(|| parser::parse(black_box(&prefixed)).unwrap())
    });
}

fn bench_map(c: &mut Criterion) {
    let xml = build_invoice(50);
    let parsed = parser::parse(&xml).unwrap();
    let config = PipelineConfig::default();
    c.bench_function("map_50_lines", |b| {
        b.iter(|| mapping::map_file(black_box(&parsed), &config).unwrap())
    });
}

fn bench_end_to_end(c: &mut Criterion) {
    let xml = build_invoice(10);
    let config = PipelineConfig::default();
    c.bench_function("ingest_bytes_10_lines", |b| {
        b.iter(|| pipeline::ingest_bytes("bench.xml", black_box(xml.as_bytes()), &config))
    });
}

criterion_group!(
    benches,
    bench_sanitize,
    bench_parse,
    bench_map,
    bench_end_to_end
);
criterion_main!(benches);
