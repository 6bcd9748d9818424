use std::sync::Arc;

use super::{HiveClient, Operation};
use crate::{
    decode::{Batch, decode_row},
    error::Result,
    protocol::Channel,
    schema::Schema,
    value::Value,
};

/// Forward cursor over the pages of one operation.
#[derive(Debug)]
pub struct ResultSet {
    operation: Operation,
    schema: Arc<Schema>,
    batch: Batch,
    offset: usize,
    length: usize,
    fetched: bool,
}

impl ResultSet {
    /// Starts a cursor; nothing is fetched until the first [`ResultSet::next`].
    pub fn new(operation: Operation, schema: Arc<Schema>) -> Self {
        Self {
            operation,
            schema,
            batch: Batch::default(),
            offset: 0,
            length: 0,
            fetched: false,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Next decoded row, fetching another page when the current one is exhausted and the
    /// server reported more. A page without rows ends iteration.
    pub fn next<C: Channel>(&mut self, client: &mut HiveClient<C>) -> Result<Option<Vec<Value>>> {
        if self.offset >= self.length {
            if !self.operation.has_result_set() || (self.fetched && !self.operation.has_more_rows)
            {
                return Ok(None);
            }

            self.batch = client.fetch_results(&mut self.operation)?;
            self.length = self.batch.row_count()?;
            self.offset = 0;
            self.fetched = true;

            if self.length == 0 {
                return Ok(None);
            }
        }

        let row = decode_row(&self.batch, &self.schema, self.offset)?;
        self.offset += 1;
        Ok(Some(row))
    }

    pub fn close<C: Channel>(self, client: &mut HiveClient<C>) -> Result<()> {
        client.close_operation(self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Options,
        decode::{Column, ColumnarBatch},
        protocol::{
            Guid, OperationHandle, Response, RpcStatus, rpc::tests::ScriptedChannel,
        },
        retry::CancelToken,
        schema::{ColumnDesc, ColumnType},
    };

    fn operation(has_result_set: bool) -> Operation {
        Operation::new(OperationHandle {
            id: Guid([3; 16]),
            has_result_set,
            modified_row_count: None,
        })
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            ColumnDesc::new("id", ColumnType::BigInt),
            ColumnDesc::new("name", ColumnType::String),
        ]))
    }

    fn page(has_more_rows: bool, ids: Vec<i64>, names: Vec<&str>) -> Response {
        let nulls = vec![0; ids.len().div_ceil(8)];
        Response::FetchResults {
            status: RpcStatus::success(),
            has_more_rows,
            results: Some(Batch::Columnar(ColumnarBatch::new(vec![
                Column::I64 {
                    values: ids,
                    nulls: nulls.clone(),
                },
                Column::String {
                    values: names.into_iter().map(String::from).collect(),
                    nulls,
                },
            ]))),
        }
    }

    fn client(responses: Vec<Response>) -> HiveClient<ScriptedChannel> {
        HiveClient::new(
            ScriptedChannel::new(responses),
            Options::default(),
            CancelToken::new(),
        )
    }

    #[test]
    fn iterates_across_pages() {
        let mut client = client(vec![
            page(true, vec![1, 2], vec!["a", "b"]),
            page(false, vec![3], vec!["c"]),
        ]);
        let mut rs = ResultSet::new(operation(true), schema());

        let mut ids = Vec::new();
        while let Some(row) = rs.next(&mut client).unwrap() {
            ids.push(row[0].as_i64().unwrap());
        }

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(client.channel().requests.len(), 2);
    }

    #[test]
    fn empty_final_pages_terminate() {
        let empty = || Response::FetchResults {
            status: RpcStatus::success(),
            has_more_rows: false,
            results: Some(Batch::default()),
        };
        let mut client = client(vec![empty(), empty()]);
        let mut rs = ResultSet::new(operation(true), schema());

        assert_eq!(rs.next(&mut client).unwrap(), None);
        assert_eq!(rs.next(&mut client).unwrap(), None);
        assert_eq!(client.channel().requests.len(), 1);
    }

    #[test]
    fn no_result_set_never_fetches() {
        let mut client = client(vec![]);
        let mut rs = ResultSet::new(operation(false), schema());

        assert_eq!(rs.next(&mut client).unwrap(), None);
        assert!(client.channel().requests.is_empty());
    }

    #[test]
    fn close_releases_operation() {
        let mut client = client(vec![Response::CloseOperation {
            status: RpcStatus::success(),
        }]);
        let rs = ResultSet::new(operation(true), schema());

        rs.close(&mut client).unwrap();
        assert!(matches!(
            client.channel().requests[0],
            crate::protocol::Request::CloseOperation(_)
        ));
    }
}
