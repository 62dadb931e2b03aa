use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::sync::Arc;
use uuid::Uuid;
use crate::errors::{StoreError, StoreResult};
use crate::models::{Task, User};
use super::store::{DocumentStore, WriteBatch, WriteOp};

// Key layout:
//   task:{id}          JSON task document
//   user:{id}          JSON user profile (pendingTasks kept out of it)
//   user:{id}:pending  SET of task ids
//   tasks / users      SET of ids per collection
//   users:email        HASH email -> user id
// COMMIT_SCRIPT spells the same keys out literally.
const TASK_IDS: &str = "tasks";
const USER_IDS: &str = "users";
const EMAIL_INDEX: &str = "users:email";

fn task_key(id: &Uuid) -> String {
    format!("task:{}", id)
}

fn user_key(id: &Uuid) -> String {
    format!("user:{}", id)
}

fn pending_key(id: &Uuid) -> String {
    format!("user:{}:pending", id)
}

// Applies one batch atomically. ARGV is a flat list of ops, each an op name
// followed by its arguments. Every precondition is checked before the first
// write, since a script cannot roll back.
const COMMIT_SCRIPT: &str = r#"
local arity = {
  put_task = 2, del_task = 1, put_user = 3, del_user = 2,
  expect_user = 1, add_pending = 2, rem_pending = 2, release_email = 1,
}
local ops = {}
local i = 1
while i <= #ARGV do
  local name = ARGV[i]
  local n = arity[name]
  if n == nil then
    return {'bad_op', name}
  end
  local op = {name}
  for j = 1, n do
    op[j + 1] = ARGV[i + j]
  end
  ops[#ops + 1] = op
  i = i + n + 1
end

local present = {}
local removed = {}
local owners = {}

local function user_exists(id)
  if present[id] ~= nil then
    return present[id]
  end
  return redis.call('EXISTS', 'user:' .. id) == 1
end

local function email_owner(email)
  if owners[email] ~= nil then
    return owners[email]
  end
  return redis.call('HGET', 'users:email', email)
end

for _, op in ipairs(ops) do
  local name = op[1]
  if name == 'expect_user' or name == 'add_pending' then
    if not user_exists(op[2]) then
      return {'missing_user', op[2]}
    end
  elseif name == 'rem_pending' then
    removed[op[2]] = removed[op[2]] or {}
    removed[op[2]][op[3]] = true
  elseif name == 'put_user' then
    local owner = email_owner(op[4])
    if owner and owner ~= op[2] then
      return {'email_taken', op[4]}
    end
    owners[op[4]] = op[2]
    present[op[2]] = true
  elseif name == 'del_user' then
    local gone = removed[op[2]] or {}
    for _, task in ipairs(redis.call('SMEMBERS', 'user:' .. op[2] .. ':pending')) do
      if not gone[task] then
        return {'pending_changed', op[2]}
      end
    end
    present[op[2]] = false
    owners[op[3]] = false
  elseif name == 'release_email' then
    owners[op[2]] = false
  end
end

for _, op in ipairs(ops) do
  local name = op[1]
  if name == 'put_task' then
    redis.call('SET', 'task:' .. op[2], op[3])
    redis.call('SADD', 'tasks', op[2])
  elseif name == 'del_task' then
    redis.call('DEL', 'task:' .. op[2])
    redis.call('SREM', 'tasks', op[2])
  elseif name == 'put_user' then
    redis.call('SET', 'user:' .. op[2], op[3])
    redis.call('SADD', 'users', op[2])
    redis.call('HSET', 'users:email', op[4], op[2])
  elseif name == 'del_user' then
    redis.call('DEL', 'user:' .. op[2], 'user:' .. op[2] .. ':pending')
    redis.call('SREM', 'users', op[2])
    if redis.call('HGET', 'users:email', op[3]) == op[2] then
      redis.call('HDEL', 'users:email', op[3])
    end
  elseif name == 'add_pending' then
    redis.call('SADD', 'user:' .. op[2] .. ':pending', op[3])
  elseif name == 'rem_pending' then
    redis.call('SREM', 'user:' .. op[2] .. ':pending', op[3])
  elseif name == 'release_email' then
    redis.call('HDEL', 'users:email', op[2])
  end
end
return {'ok'}
"#;

// Flattens a batch into the script's ARGV
fn encode_ops(ops: Vec<WriteOp>) -> StoreResult<Vec<String>> {
    let mut args = Vec::new();
    for op in ops {
        match op {
            WriteOp::PutTask(task) => {
                let doc = serde_json::to_string(&task)?;
                args.extend(["put_task".to_string(), task.id.to_string(), doc]);
            }
            WriteOp::DeleteTask(id) => {
                args.extend(["del_task".to_string(), id.to_string()]);
            }
            WriteOp::PutUser(user) => {
                let profile = User { pending_tasks: Vec::new(), ..user };
                let doc = serde_json::to_string(&profile)?;
                args.extend(["put_user".to_string(), profile.id.to_string(), doc, profile.email]);
            }
            WriteOp::DeleteUser { id, email } => {
                args.extend(["del_user".to_string(), id.to_string(), email]);
            }
            WriteOp::ExpectUser(id) => {
                args.extend(["expect_user".to_string(), id.to_string()]);
            }
            WriteOp::AddPending { user_id, task_id } => {
                args.extend(["add_pending".to_string(), user_id.to_string(), task_id.to_string()]);
            }
            WriteOp::RemovePending { user_id, task_id } => {
                args.extend(["rem_pending".to_string(), user_id.to_string(), task_id.to_string()]);
            }
            WriteOp::ReleaseEmail(email) => {
                args.extend(["release_email".to_string(), email]);
            }
        }
    }
    Ok(args)
}

// Turns the script's reply into the matching rejection
fn decode_outcome(reply: &[String]) -> StoreResult<()> {
    match reply {
        [status] if status == "ok" => Ok(()),
        [kind, detail] => match kind.as_str() {
            "missing_user" => Err(StoreError::MissingUser(parse_stored_id(detail)?)),
            "pending_changed" => Err(StoreError::PendingChanged(parse_stored_id(detail)?)),
            "email_taken" => Err(StoreError::EmailTaken(detail.clone())),
            _ => Err(StoreError::Corrupt(format!("commit script refused: {} {}", kind, detail))),
        },
        other => Err(StoreError::Corrupt(format!("unexpected commit reply {:?}", other))),
    }
}

fn parse_stored_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| StoreError::Corrupt(format!("bad id '{}'", raw)))
}

fn decode_user(data: &str, pending: Vec<String>) -> StoreResult<User> {
    let mut user: User = serde_json::from_str(data)?;
    user.pending_tasks = pending
        .iter()
        .map(|raw| parse_stored_id(raw))
        .collect::<StoreResult<_>>()?;
    Ok(user)
}

#[derive(Clone)]
pub struct RedisService {
    conn: ConnectionManager,
    commit_script: Arc<Script>,
}

impl RedisService {
    pub async fn connect(client: Client) -> Result<Self, redis::RedisError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            commit_script: Arc::new(Script::new(COMMIT_SCRIPT)),
        })
    }

    // MGET that tolerates an empty key list
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        let mut conn = self.conn.clone();
        let docs: Vec<Option<String>> = cmd.query_async(&mut conn).await?;
        Ok(docs)
    }

    async fn collection_ids(&self, set: &str) -> StoreResult<Vec<Uuid>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(set).await?;
        ids.iter().map(|raw| parse_stored_id(raw)).collect()
    }
}

#[async_trait]
impl DocumentStore for RedisService {
    async fn find_task(&self, id: &Uuid) -> StoreResult<Option<Task>> {
        let mut conn = self.conn.clone();
        let task_data: Option<String> = conn.get(task_key(id)).await?;
        Ok(task_data.map(|data| serde_json::from_str(&data)).transpose()?)
    }

    async fn find_user(&self, id: &Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.conn.clone();
        let (user_data, pending): (Option<String>, Vec<String>) = redis::pipe()
            .get(user_key(id))
            .smembers(pending_key(id))
            .query_async(&mut conn)
            .await?;
        user_data.map(|data| decode_user(&data, pending)).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn.clone();
        let id: Option<String> = conn.hget(EMAIL_INDEX, email).await?;
        match id {
            Some(raw) => self.find_user(&parse_stored_id(&raw)?).await,
            None => Ok(None),
        }
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let ids = self.collection_ids(TASK_IDS).await?;
        let keys: Vec<String> = ids.iter().map(task_key).collect();

        let mut tasks = Vec::with_capacity(keys.len());
        for data in self.get_many(&keys).await?.into_iter().flatten() {
            tasks.push(serde_json::from_str(&data)?);
        }
        Ok(tasks)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let ids = self.collection_ids(USER_IDS).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(user_key).collect();
        let docs = self.get_many(&keys).await?;

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.smembers(pending_key(id));
        }
        let mut conn = self.conn.clone();
        let pendings: Vec<Vec<String>> = pipe.query_async(&mut conn).await?;

        let mut users = Vec::with_capacity(ids.len());
        for (data, pending) in docs.into_iter().zip(pendings) {
            // An id without a document is a leftover from an interrupted delete
            if let Some(data) = data {
                users.push(decode_user(&data, pending)?);
            }
        }
        Ok(users)
    }

    // One script run per batch: checks, then writes, with nothing in between
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        tracing::debug!("Committing batch of {} ops to Redis", batch.len());

        let args = encode_ops(batch.into_ops())?;
        let mut invocation = self.commit_script.prepare_invoke();
        for arg in &args {
            invocation.arg(arg);
        }

        let mut conn = self.conn.clone();
        let reply: Vec<String> = invocation.invoke_async(&mut conn).await.map_err(|e| {
            tracing::error!("Redis commit failed: {}", e);
            StoreError::Redis(e)
        })?;
        decode_outcome(&reply).map_err(|e| {
            tracing::warn!("Batch rejected: {}", e);
            e
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
