use std::{fs::File, path::Path, sync::Arc};

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::enrich::EnrichedTrip;

pub fn enriched_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("pickup_at", DataType::Timestamp(TimeUnit::Microsecond, None), true),
        Field::new("passenger_count", DataType::Int64, true),
        Field::new("payment_type", DataType::Int64, true),
        Field::new("fare_amount", DataType::Float64, true),
        Field::new("tip_amount", DataType::Float64, true),
        Field::new("total_amount", DataType::Float64, true),
        Field::new("airport_fee", DataType::Float64, true),
        Field::new("is_airport_trip", DataType::Boolean, false),
        Field::new("total_surcharge", DataType::Float64, true),
        Field::new("total_amount_converted", DataType::Float64, true),
        Field::new("passenger_category", DataType::Utf8, false),
    ]))
}

pub fn to_record_batch(rows: &[EnrichedTrip]) -> Result<RecordBatch> {
    let floats = |f: fn(&EnrichedTrip) -> Option<f64>| -> ArrayRef {
        Arc::new(rows.iter().map(f).collect::<Float64Array>())
    };
    let ints = |f: fn(&EnrichedTrip) -> Option<i64>| -> ArrayRef {
        Arc::new(rows.iter().map(f).collect::<Int64Array>())
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(
            rows.iter()
                .map(|r| r.trip.pickup_at.map(|at| at.and_utc().timestamp_micros()))
                .collect::<TimestampMicrosecondArray>(),
        ),
        ints(|r| r.trip.passenger_count),
        ints(|r| r.trip.payment_type),
        floats(|r| r.trip.fare_amount),
        floats(|r| r.trip.tip_amount),
        floats(|r| r.trip.total_amount),
        floats(|r| r.trip.airport_fee),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.is_airport_trip).collect::<Vec<_>>(),
        )),
        floats(|r| r.total_surcharge),
        floats(|r| r.total_amount_converted),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.passenger_category.label()),
        )),
    ];

    RecordBatch::try_new(enriched_schema(), columns).context("building enriched trip batch")
}

/// Write enriched rows to a single SNAPPY-compressed Parquet file.
pub fn write_parquet(path: &Path, rows: &[EnrichedTrip]) -> Result<()> {
    let batch = to_record_batch(rows)?;
    let file = File::create(path).with_context(|| format!("creating export file {:?}", path))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, enriched_schema(), Some(props))
        .context("creating Arrow writer for export")?;
    writer.write(&batch).context("writing export batch")?;
    writer.close().context("closing export writer")?;
    info!(path = %path.display(), rows = rows.len(), "enriched trips exported");
    Ok(())
}
